//! Age-based pruning of backup artifact directories.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{info, warn};

use crate::BackupError;

/// Fixed-width timestamp used for backup directory names. Lexicographic
/// order equals chronological order, and the name parses back into the
/// creation time for retention decisions.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub removed: usize,
    pub kept: usize,
    /// Entries passed over because of a parse or delete failure.
    pub skipped: usize,
}

/// Walk `root` one level (per-container directories), then one level
/// deeper (per-timestamp directories), and delete every timestamp
/// directory strictly older than `retention_hours`. A directory exactly
/// `retention_hours` old is retained.
///
/// A parse failure or a single deletion failure is logged and that entry
/// skipped; pruning continues for all other entries.
pub async fn prune_old_backups(
    root: &Path,
    retention_hours: u64,
    now: DateTime<Local>,
) -> Result<PruneStats, BackupError> {
    let mut stats = PruneStats::default();

    let mut containers = tokio::fs::read_dir(root).await.map_err(|source| {
        BackupError::ReadRoot {
            path: root.to_path_buf(),
            source,
        }
    })?;

    loop {
        let entry = match containers.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "unable to walk backup root");
                break;
            }
        };
        if !is_dir(&entry).await {
            continue;
        }
        prune_container_dir(&entry.path(), retention_hours, now, &mut stats).await;
    }

    info!(
        removed = stats.removed,
        kept = stats.kept,
        skipped = stats.skipped,
        "retention pruning finished"
    );
    Ok(stats)
}

async fn prune_container_dir(
    dir: &Path,
    retention_hours: u64,
    now: DateTime<Local>,
    stats: &mut PruneStats,
) {
    let mut backups = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "unable to read container backup directory");
            return;
        }
    };

    loop {
        let entry = match backups.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "unable to walk container backup directory");
                break;
            }
        };
        if !is_dir(&entry).await {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let created = match NaiveDateTime::parse_from_str(&name, TIMESTAMP_FORMAT) {
            Ok(created) => created,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "unparseable backup directory name");
                stats.skipped += 1;
                continue;
            }
        };

        let age = now.naive_local().signed_duration_since(created);
        if age > chrono::Duration::hours(retention_hours as i64) {
            info!(path = %entry.path().display(), age_hours = age.num_hours(), "removing expired backup");
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => stats.removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "unable to remove expired backup");
                    stats.skipped += 1;
                }
            }
        } else {
            stats.kept += 1;
        }
    }
}

async fn is_dir(entry: &tokio::fs::DirEntry) -> bool {
    entry
        .file_type()
        .await
        .map(|file_type| file_type.is_dir())
        .unwrap_or(false)
}
