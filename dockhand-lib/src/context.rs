//! Process-wide context: the configuration, the runtime client and the
//! notifier, constructed once at startup and passed by reference into
//! the orchestrator and monitor. No ambient globals.

use std::sync::Arc;

use tracing::info;

use dockhand_common::{ContainerRuntime, HelperSpec, Notifier};
use dockhand_executor::DockerRuntime;

use crate::config::AgentConfig;
use crate::notify::{AgentNotifier, NotifyLevel, TelegramNotifier};

#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<AgentConfig>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub notifier: Arc<dyn Notifier>,
}

impl AgentContext {
    /// Connect to the container runtime and assemble the notifier stack.
    pub fn new(config: AgentConfig) -> dockhand_common::Result<Self> {
        let runtime = DockerRuntime::connect()?;

        let telegram = (!config.telegram_bot_token.is_empty()).then(|| {
            info!(chats = config.telegram_chat_ids.len(), "telegram notifications enabled");
            TelegramNotifier::new(
                config.telegram_bot_token.clone(),
                config.telegram_chat_ids.clone(),
            )
        });
        let notifier = AgentNotifier::new(NotifyLevel::parse(&config.notify_level), telegram);

        Ok(Self {
            config: Arc::new(config),
            runtime: Arc::new(runtime),
            notifier: Arc::new(notifier),
        })
    }

    /// Run one throwaway echo helper to prove the runtime can pull the
    /// helper image and execute containers end to end.
    pub async fn self_test(&self) -> dockhand_common::Result<()> {
        info!("running runtime self test");
        let run = self
            .runtime
            .run_helper(HelperSpec {
                name: "dockhand-self-test".to_string(),
                image: self.config.helper_image.clone(),
                cmd: vec!["echo".to_string(), "dockhand self test".to_string()],
                volumes_from: Vec::new(),
                binds: Vec::new(),
            })
            .await?;
        info!(exit_code = run.exit_code, "runtime self test finished");
        Ok(())
    }
}
