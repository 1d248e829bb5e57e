//! Locates the host filesystem path backing the agent's backup mount.

use dockhand_common::ContainerSnapshot;
use tracing::debug;

/// Scan `containers` for the management container (any name containing
/// `marker`, case-insensitive) and return the host-side source of the
/// first of its mounts whose destination equals `backup_path`
/// (case-insensitive).
///
/// Without this path the archives would be written into the throwaway
/// helper container's filesystem and lost, so `None` is fatal for the
/// whole run rather than a per-container error.
pub fn resolve_host_backup_path(
    containers: &[ContainerSnapshot],
    marker: &str,
    backup_path: &str,
) -> Option<String> {
    for container in containers {
        if !container.name_contains(marker) {
            continue;
        }
        for mount in &container.mounts {
            debug!(
                destination = %mount.destination,
                configured = %backup_path,
                "inspecting management container mount"
            );
            if mount.destination.eq_ignore_ascii_case(backup_path) {
                return Some(mount.source.clone());
            }
        }
    }
    None
}
