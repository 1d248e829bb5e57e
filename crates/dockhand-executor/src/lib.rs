//! Docker implementation of the `ContainerRuntime` capability surface.
//!
//! The one non-trivial primitive here is `run_helper`: pull the image on
//! demand, create the container, start it, wait for it to stop, collect
//! its combined output and remove it. Removal happens on every exit path,
//! success or failure, so a failed archive never leaves a helper behind.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{ContainerSummary, HostConfig, Mount, MountTypeEnum, MountPointTypeEnum};
use bollard::Docker;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use dockhand_common::{
    AgentError, ContainerRuntime, ContainerSnapshot, HelperRun, HelperSpec, MountKind, MountPoint,
};

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(#[source] BollardError),
    #[error("Image pull failed for {image}: {source}")]
    PullFailed {
        image: String,
        #[source]
        source: BollardError,
    },
    #[error("Container creation failed: {0}")]
    CreationFailed(#[source] BollardError),
    #[error("Container start failed: {0}")]
    StartFailed(#[source] BollardError),
    #[error("Container wait failed: {0}")]
    WaitFailed(#[source] BollardError),
    #[error("Container wait ended without a result")]
    WaitEnded,
    #[error("Container log retrieval failed: {0}")]
    LogRetrievalFailed(#[source] BollardError),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] BollardError), // Catch-all for other bollard errors
}

impl From<ExecutorError> for AgentError {
    fn from(err: ExecutorError) -> Self {
        AgentError::Runtime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

// --- DockerRuntime Implementation ---

#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using the environment's Docker socket settings.
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults().map_err(ExecutorError::ConnectionFailed)?;
        Ok(Self { client })
    }

    /// Pull `image` unless some local image already carries that tag.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;
        let present = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag == image));
        if present {
            debug!(%image, "image already pulled");
            return Ok(());
        }

        info!(%image, "pulling image");
        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            let update = progress.map_err(|source| ExecutorError::PullFailed {
                image: image.to_string(),
                source,
            })?;
            if let Some(status) = update.status {
                debug!(%image, %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_helper(&self, spec: &HelperSpec) -> Result<String> {
        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        });

        let mounts: Vec<Mount> = spec
            .binds
            .iter()
            .map(|bind| Mount {
                target: Some(bind.target.clone()),
                source: Some(bind.source.clone()),
                typ: Some(MountTypeEnum::BIND),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            volumes_from: (!spec.volumes_from.is_empty()).then(|| spec.volumes_from.clone()),
            mounts: (!mounts.is_empty()).then_some(mounts),
            ..Default::default()
        };

        let body = self
            .client
            .create_container(
                options,
                Config {
                    image: Some(spec.image.clone()),
                    cmd: Some(spec.cmd.clone()),
                    tty: Some(false),
                    network_disabled: Some(true),
                    host_config: Some(host_config),
                    ..Default::default()
                },
            )
            .await
            .map_err(ExecutorError::CreationFailed)?;
        Ok(body.id)
    }

    /// Start the helper, wait for it to stop and drain its output.
    async fn drive_helper(&self, id: &str) -> Result<HelperRun> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(ExecutorError::StartFailed)?;

        let mut wait = self.client.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );
        let exit_code = match wait.next().await {
            Some(Ok(body)) => body.status_code,
            // bollard reports a non-zero exit status as an error; for a
            // helper that is just an exit code to pass along.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(ExecutorError::WaitFailed(e)),
            None => return Err(ExecutorError::WaitEnded),
        };
        debug!(container = %id, exit_code, "helper finished");

        let mut stream = self.client.logs(
            id,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        let mut output = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.extend_from_slice(&message);
                }
                Ok(_) => {}
                Err(e) => return Err(ExecutorError::LogRetrievalFailed(e)),
            }
        }

        Ok(HelperRun { exit_code, output })
    }

    async fn remove_forced(&self, id: &str) {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        if let Err(e) = self.client.remove_container(id, options).await {
            warn!(container = %id, error = %e, "failed to remove helper container");
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> dockhand_common::Result<Vec<ContainerSnapshot>> {
        let options = Some(ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        });
        let summaries = self
            .client
            .list_containers(options)
            .await
            .map_err(ExecutorError::DockerApi)?;
        Ok(summaries.into_iter().map(snapshot_from_summary).collect())
    }

    async fn run_helper(&self, spec: HelperSpec) -> dockhand_common::Result<HelperRun> {
        self.ensure_image(&spec.image).await?;
        let id = self.create_helper(&spec).await?;
        let outcome = self.drive_helper(&id).await;
        // Unconditional removal, also on the error path.
        self.remove_forced(&id).await;
        Ok(outcome?)
    }
}

fn snapshot_from_summary(summary: ContainerSummary) -> ContainerSnapshot {
    ContainerSnapshot {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        mounts: summary
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountPoint {
                kind: mount_kind(m.typ),
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
            })
            .collect(),
    }
}

fn mount_kind(typ: Option<MountPointTypeEnum>) -> MountKind {
    match typ {
        Some(MountPointTypeEnum::BIND) => MountKind::Bind,
        Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
        Some(MountPointTypeEnum::TMPFS) => MountKind::Tmpfs,
        Some(MountPointTypeEnum::NPIPE) => MountKind::Npipe,
        _ => MountKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::MountPoint as RuntimeMountPoint;

    #[test]
    fn summary_maps_onto_snapshot() {
        let summary = ContainerSummary {
            id: Some("abc123".to_string()),
            names: Some(vec!["/web".to_string()]),
            image: Some("nginx:1.27".to_string()),
            state: Some("running".to_string()),
            status: Some("Up 10 minutes".to_string()),
            mounts: Some(vec![RuntimeMountPoint {
                typ: Some(MountPointTypeEnum::BIND),
                source: Some("/srv/web".to_string()),
                destination: Some("/usr/share/nginx/html".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let snapshot = snapshot_from_summary(summary);
        assert_eq!(snapshot.id, "abc123");
        assert_eq!(snapshot.display_name(), "web");
        assert_eq!(snapshot.mounts.len(), 1);
        assert_eq!(snapshot.mounts[0].kind, MountKind::Bind);
        assert_eq!(snapshot.mounts[0].destination, "/usr/share/nginx/html");
    }

    #[test]
    fn missing_summary_fields_default_to_empty() {
        let snapshot = snapshot_from_summary(ContainerSummary::default());
        assert!(snapshot.id.is_empty());
        assert!(snapshot.names.is_empty());
        assert!(snapshot.mounts.is_empty());
    }

    #[test]
    fn unknown_mount_types_map_to_other() {
        assert_eq!(mount_kind(None), MountKind::Other);
        assert_eq!(mount_kind(Some(MountPointTypeEnum::EMPTY)), MountKind::Other);
        assert_eq!(mount_kind(Some(MountPointTypeEnum::VOLUME)), MountKind::Volume);
    }
}
