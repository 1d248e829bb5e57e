//! Mount exclusion rules applied before archiving.

use std::fmt;

use dockhand_common::MountPoint;

/// Suffix identifying unix-socket backed mounts.
const SOCKET_SUFFIX: &str = ".sock";

/// The runtime's internal volume storage. A helper archiving a path under
/// here would sweep up every other container's volume data.
const RUNTIME_VOLUME_PATH: &str = "/var/lib/docker/volumes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Socket,
    RootSource,
    RuntimeVolumeStorage,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Socket => "mount is socket-backed",
            SkipReason::RootSource => "mount source is the root filesystem",
            SkipReason::RuntimeVolumeStorage => {
                "mount destination is runtime-internal volume storage"
            }
        };
        f.write_str(reason)
    }
}

/// Rules are applied in order; the first hit wins. A skipped mount is a
/// warning for the operator, never an error.
pub fn exclusion_for(mount: &MountPoint) -> Option<SkipReason> {
    if mount.destination.ends_with(SOCKET_SUFFIX) || mount.source.ends_with(SOCKET_SUFFIX) {
        Some(SkipReason::Socket)
    } else if mount.source == "/" {
        Some(SkipReason::RootSource)
    } else if mount.destination.contains(RUNTIME_VOLUME_PATH) {
        Some(SkipReason::RuntimeVolumeStorage)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_common::MountKind;

    fn mount(source: &str, destination: &str) -> MountPoint {
        MountPoint {
            kind: MountKind::Bind,
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }

    #[test]
    fn socket_mounts_are_skipped_on_either_side() {
        assert_eq!(
            exclusion_for(&mount("/var/run/docker.sock", "/var/run/docker.sock")),
            Some(SkipReason::Socket)
        );
        assert_eq!(
            exclusion_for(&mount("/srv/app", "/run/app.sock")),
            Some(SkipReason::Socket)
        );
    }

    #[test]
    fn root_source_is_skipped() {
        assert_eq!(exclusion_for(&mount("/", "/host")), Some(SkipReason::RootSource));
    }

    #[test]
    fn runtime_volume_destination_is_skipped() {
        assert_eq!(
            exclusion_for(&mount("/srv/data", "/var/lib/docker/volumes/db/_data")),
            Some(SkipReason::RuntimeVolumeStorage)
        );
    }

    #[test]
    fn ordinary_mounts_pass() {
        assert_eq!(exclusion_for(&mount("/srv/data", "/data")), None);
        // A volume's host source living under the runtime path is fine;
        // only the destination rule applies there.
        assert_eq!(
            exclusion_for(&mount("/var/lib/docker/volumes/db/_data", "/data")),
            None
        );
    }
}
