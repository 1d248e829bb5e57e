//! Backup orchestrator: archives the bind-mounted volumes of every
//! container (except the management container itself) by running one
//! ephemeral tar helper per eligible mount, under a bounded concurrency
//! cap, then prunes expired backups.
//!
//! Artifacts land in `<backup_root>/<container>/<timestamp>/` as one
//! `.tar` plus sibling `.log` per mount and a `ContainerInfo.txt`
//! metadata dump of the container snapshot.

mod exclude;
mod hooks;
mod resolve;
mod retention;

pub use exclude::{exclusion_for, SkipReason};
pub use resolve::resolve_host_backup_path;
pub use retention::{prune_old_backups, PruneStats, TIMESTAMP_FORMAT};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use dockhand_common::{
    AgentError, BindMount, ContainerRuntime, ContainerSnapshot, HelperSpec,
};

/// File name of the per-backup container snapshot dump.
pub const METADATA_FILE: &str = "ContainerInfo.txt";

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum BackupError {
    #[error(
        "host backup path not found; the management container must bind-mount the backup path"
    )]
    BackupPathUnresolved,
    #[error("failed to list containers: {0}")]
    ListContainers(#[source] AgentError),
    #[error("backup of {container} failed on mount {mount}: {source}")]
    Mount {
        container: String,
        mount: String,
        #[source]
        source: AgentError,
    },
    #[error("failed to prepare backup directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read backup root {path}: {source}")]
    ReadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backup worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Backup staging path as seen from inside the management container.
    /// The same path is bind-mounted into every helper.
    pub backup_root: PathBuf,
    /// Directory receiving hook command logs.
    pub logs_path: PathBuf,
    pub retention_hours: u64,
    /// Cap on simultaneously running per-container backup tasks.
    pub concurrent_containers: usize,
    /// Name fragment identifying the management container.
    pub management_marker: String,
    /// Image the tar helpers run, pulled on demand and cached by tag.
    pub helper_image: String,
    pub before_backup_cmd: Option<String>,
    pub after_backup_cmd: Option<String>,
}

/// Result of one container's backup task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Number of mounts actually archived (excluded mounts don't count).
    Archived(usize),
    NoMounts,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub archived: usize,
    pub no_mounts: usize,
    pub failed: usize,
    pub pruned: usize,
}

pub struct BackupOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    config: BackupConfig,
}

impl BackupOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: BackupConfig) -> Self {
        Self { runtime, config }
    }

    /// Execute one full backup run over the current container set.
    ///
    /// Only the unresolved-backup-path and container-listing preconditions
    /// fail the run as a whole; per-container archive failures are counted
    /// in the summary and never abort other containers' tasks.
    pub async fn run(&self) -> Result<RunSummary, BackupError> {
        info!("starting backup run");
        let containers = self
            .runtime
            .list_containers(true)
            .await
            .map_err(BackupError::ListContainers)?;

        let backup_root = self.config.backup_root.to_string_lossy().into_owned();
        let host_root =
            resolve_host_backup_path(&containers, &self.config.management_marker, &backup_root)
                .ok_or(BackupError::BackupPathUnresolved)?;
        info!(%host_root, "resolved host backup path");

        hooks::run_hook(
            "BeforeBackupCMD",
            self.config.before_backup_cmd.as_deref(),
            &self.config.logs_path,
        )
        .await;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_containers.max(1)));
        let mut tasks: JoinSet<(String, Result<BackupOutcome, BackupError>)> = JoinSet::new();
        for container in containers {
            if container.name_contains(&self.config.management_marker) {
                continue;
            }

            // Admission control: holds dispatch here once the cap is
            // reached; the permit travels into the task and is released
            // when the task completes.
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| BackupError::Worker(e.to_string()))?;
            let runtime = Arc::clone(&self.runtime);
            let config = self.config.clone();
            let host_root = host_root.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let name = container.display_name();
                let outcome = backup_one(runtime.as_ref(), &container, &host_root, &config).await;
                (name, outcome)
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(BackupOutcome::Archived(count)))) => {
                    info!(container = %name, archives = count, "backup finished");
                    summary.archived += 1;
                }
                Ok((name, Ok(BackupOutcome::NoMounts))) => {
                    info!(container = %name, "container has no mounts, nothing to archive");
                    summary.no_mounts += 1;
                }
                Ok((name, Err(e))) => {
                    error!(container = %name, error = %e, "backup failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "backup worker panicked");
                    summary.failed += 1;
                }
            }
        }

        hooks::run_hook(
            "AfterBackupCMD",
            self.config.after_backup_cmd.as_deref(),
            &self.config.logs_path,
        )
        .await;

        let stats = prune_old_backups(
            &self.config.backup_root,
            self.config.retention_hours,
            Local::now(),
        )
        .await?;
        summary.pruned = stats.removed;

        info!(
            archived = summary.archived,
            no_mounts = summary.no_mounts,
            failed = summary.failed,
            pruned = summary.pruned,
            "backup run complete"
        );
        Ok(summary)
    }
}

/// Archive every eligible mount of one container, strictly sequentially.
///
/// A mount-level failure aborts this container's remaining mounts and is
/// reported as this container's error; metadata and helper-log write
/// failures are advisory.
async fn backup_one(
    runtime: &dyn ContainerRuntime,
    container: &ContainerSnapshot,
    host_root: &str,
    config: &BackupConfig,
) -> Result<BackupOutcome, BackupError> {
    if container.mounts.is_empty() {
        return Ok(BackupOutcome::NoMounts);
    }

    let name = container.display_name();
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let dest_dir = config.backup_root.join(&name).join(&timestamp);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .map_err(|source| BackupError::Prepare {
            path: dest_dir.clone(),
            source,
        })?;

    write_metadata(&dest_dir, container).await;

    let mut archived = 0usize;
    for (index, mount) in container.mounts.iter().enumerate() {
        if let Some(reason) = exclusion_for(mount) {
            warn!(
                container = %name,
                source = %mount.source,
                destination = %mount.destination,
                %reason,
                "skipping mount"
            );
            continue;
        }

        let sanitized = mount.destination.replace('/', "_");
        let tar_path = dest_dir.join(format!("{}{sanitized}.tar", mount.kind));
        let helper_name = format!("dockhand-backup-{name}-m{index}-{sanitized}");

        info!(container = %name, helper = %helper_name, destination = %mount.destination, "archiving mount");
        let spec = HelperSpec {
            name: helper_name,
            image: config.helper_image.clone(),
            cmd: vec![
                "tar".to_string(),
                "cvf".to_string(),
                tar_path.to_string_lossy().into_owned(),
                mount.destination.clone(),
            ],
            volumes_from: vec![container.id.clone()],
            binds: vec![BindMount {
                source: host_root.to_string(),
                target: config.backup_root.to_string_lossy().into_owned(),
            }],
        };

        let run = runtime
            .run_helper(spec)
            .await
            .map_err(|source| BackupError::Mount {
                container: name.clone(),
                mount: mount.destination.clone(),
                source,
            })?;
        if run.exit_code != 0 {
            // Live-filesystem tar legitimately reports changed files; the
            // archive is still written, so this is not a failure.
            warn!(
                container = %name,
                destination = %mount.destination,
                exit_code = run.exit_code,
                "tar helper exited non-zero"
            );
        }

        let log_path = tar_path.with_extension("log");
        if let Err(e) = tokio::fs::write(&log_path, &run.output).await {
            warn!(container = %name, path = %log_path.display(), error = %e, "unable to save helper log");
        }
        archived += 1;
    }

    Ok(BackupOutcome::Archived(archived))
}

async fn write_metadata(dir: &Path, container: &ContainerSnapshot) {
    let path = dir.join(METADATA_FILE);
    match serde_json::to_vec_pretty(container) {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                warn!(container = %container.display_name(), error = %e, "unable to save container metadata");
            }
        }
        Err(e) => {
            warn!(container = %container.display_name(), error = %e, "unable to serialize container metadata");
        }
    }
}
