// Shared data model and capability traits for the dockhand agent.
//
// Everything the orchestrator and monitor consume from the container
// runtime goes through the `ContainerRuntime` trait defined here, so both
// can be exercised against a fake runtime in tests.

use std::fmt::Display;

use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Runtime Error: {0}")]
    Runtime(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Kind of a container mount, as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Tmpfs,
    Npipe,
    Other,
}

impl MountKind {
    /// Lowercase form used in backup artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
            MountKind::Tmpfs => "tmpfs",
            MountKind::Npipe => "npipe",
            MountKind::Other => "other",
        }
    }
}

impl Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared mount of a container: where it comes from on the host and
/// where it is visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub kind: MountKind,
    pub source: String,
    pub destination: String,
}

/// Point-in-time view of a container, re-fetched from the runtime every
/// cycle. Serializable so the backup metadata artifact round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    /// Lifecycle state, e.g. "running" or "exited".
    pub state: String,
    /// Human status line, e.g. "Up 2 hours (healthy)".
    pub status: String,
    pub mounts: Vec<MountPoint>,
}

impl ContainerSnapshot {
    /// Primary name with the runtime's leading slash stripped; falls back
    /// to a truncated id for the rare unnamed container.
    pub fn display_name(&self) -> String {
        match self.names.first() {
            Some(name) => name.replace('/', ""),
            None => self.id.chars().take(12).collect(),
        }
    }

    /// True if any of the container's names contains `marker`,
    /// case-insensitively. Used to recognize the management container.
    pub fn name_contains(&self, marker: &str) -> bool {
        let marker = marker.to_lowercase();
        self.names
            .iter()
            .any(|name| name.to_lowercase().contains(&marker))
    }
}

/// Bind mount handed to a helper container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
}

/// Everything needed to run one ephemeral helper container to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// Containers whose mount set the helper shares (volumes-from).
    pub volumes_from: Vec<String>,
    pub binds: Vec<BindMount>,
}

/// Outcome of a completed helper container run.
#[derive(Debug, Clone)]
pub struct HelperRun {
    pub exit_code: i64,
    /// Combined stdout/stderr of the helper.
    pub output: Vec<u8>,
}

/// Call surface over the container runtime. The helper primitive pulls the
/// image on demand, runs the container to completion, collects its
/// combined output and removes it regardless of how the run ended.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerSnapshot>>;

    async fn run_helper(&self, spec: HelperSpec) -> Result<HelperRun>;
}

/// Severity attached to an outbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outbound alert sink. Implementations must never fail the caller; a
/// delivery problem is theirs to log.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, severity: Severity, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> ContainerSnapshot {
        ContainerSnapshot {
            id: "8f3c1a2b9d4e".to_string(),
            names: vec!["/postgres-main".to_string()],
            image: "postgres:16".to_string(),
            state: "running".to_string(),
            status: "Up 4 hours (healthy)".to_string(),
            mounts: vec![MountPoint {
                kind: MountKind::Volume,
                source: "/var/lib/docker/volumes/pgdata/_data".to_string(),
                destination: "/var/lib/postgresql/data".to_string(),
            }],
        }
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        let parsed: ContainerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, snapshot.id);
        assert_eq!(parsed.names, snapshot.names);
        assert_eq!(parsed.mounts, snapshot.mounts);
    }

    #[test]
    fn display_name_strips_runtime_slash() {
        assert_eq!(sample_snapshot().display_name(), "postgres-main");

        let unnamed = ContainerSnapshot {
            names: vec![],
            ..sample_snapshot()
        };
        assert_eq!(unnamed.display_name(), "8f3c1a2b9d4e");
    }

    #[test]
    fn name_matching_is_case_insensitive() {
        let snapshot = ContainerSnapshot {
            names: vec!["/Dockhand-Mgmt".to_string()],
            ..sample_snapshot()
        };
        assert!(snapshot.name_contains("dockhand"));
        assert!(!snapshot.name_contains("postgres"));
    }

    #[test]
    fn mount_kind_renders_lowercase() {
        assert_eq!(MountKind::Bind.to_string(), "bind");
        assert_eq!(MountKind::Volume.as_str(), "volume");
    }
}
