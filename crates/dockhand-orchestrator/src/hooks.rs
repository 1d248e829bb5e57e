//! Optional user-configured shell commands around a backup run.

use std::path::Path;

use chrono::Local;
use tokio::process::Command;
use tracing::{info, warn};

use crate::retention::TIMESTAMP_FORMAT;

/// Run `cmd` through the host shell, if configured. Combined output is
/// captured to a timestamped `<label>-<ts>.log` under `logs_path`. A hook
/// problem never aborts the backup run; it is logged and the run
/// continues.
pub async fn run_hook(label: &str, cmd: Option<&str>, logs_path: &Path) {
    let Some(cmd) = cmd.filter(|c| !c.trim().is_empty()) else {
        return;
    };

    info!(hook = label, %cmd, "running hook command");
    let output = match Command::new("sh").arg("-c").arg(cmd).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(hook = label, error = %e, "hook command failed to start");
            return;
        }
    };
    if !output.status.success() {
        warn!(hook = label, status = %output.status, "hook command exited non-zero");
    }

    let mut contents = output.stdout;
    contents.extend_from_slice(&output.stderr);

    if let Err(e) = tokio::fs::create_dir_all(logs_path).await {
        warn!(hook = label, path = %logs_path.display(), error = %e, "unable to create logs directory");
        return;
    }
    let file = logs_path.join(format!(
        "{label}-{}.log",
        Local::now().format(TIMESTAMP_FORMAT)
    ));
    if let Err(e) = tokio::fs::write(&file, contents).await {
        warn!(hook = label, path = %file.display(), error = %e, "unable to save hook log");
    }
}
