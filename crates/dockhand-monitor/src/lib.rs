//! Health monitor: periodically samples the live state of every
//! container, keeps a bounded per-container history and surfaces only
//! debounce-confirmed transitions to the notifier.

mod state;

pub use state::{advance, HealthEvent, MonitorRecord, MonitorState};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use dockhand_common::{ContainerRuntime, ContainerSnapshot, Notifier, Severity};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Consecutive matching samples required before a classification
    /// changes in either direction.
    pub retries: usize,
}

pub struct HealthMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    /// Keyed by container name; owned solely by the sampling loop.
    records: HashMap<String, MonitorRecord>,
}

impl HealthMonitor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            runtime,
            notifier,
            config,
            records: HashMap::new(),
        }
    }

    /// Run the sampling loop until `shutdown` flips to true. A failed
    /// cycle is logged and the loop continues on its next tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retries = self.config.retries,
            "health monitor started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.sample_once().await {
                        warn!(error = %e, "monitor sampling cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// One sampling step over the current container set.
    pub async fn sample_once(&mut self) -> dockhand_common::Result<()> {
        let containers = self.runtime.list_containers(true).await?;

        let mut seen = HashSet::with_capacity(containers.len());
        for container in &containers {
            let key = container.display_name();
            seen.insert(key.clone());

            let raw = raw_state(container);
            let record = self.records.entry(key.clone()).or_default();
            record.observe(raw);

            let (next, event) = advance(record.state, &record.samples, self.config.retries);
            if next != record.state {
                debug!(container = %key, from = %record.state, to = %next, "classification changed");
            }
            record.state = next;
            record.compact(self.config.retries);

            match event {
                Some(HealthEvent::Recovered) => {
                    self.notifier
                        .notify(Severity::Info, &format!("{key} is UP and running again"))
                        .await;
                }
                Some(HealthEvent::WentDown(new_state)) => {
                    self.notifier
                        .notify(Severity::Error, &format!("{key} is {new_state}!"))
                        .await;
                }
                None => {}
            }
        }

        // Containers gone from the listing restart from scratch if they
        // ever come back.
        self.records.retain(|key, _| seen.contains(key));
        Ok(())
    }

    /// Committed classification for a container, if it is being tracked.
    pub fn classification(&self, container: &str) -> Option<MonitorState> {
        self.records.get(container).map(|record| record.state)
    }
}

/// Raw state string sampled from a snapshot. A health-checked container
/// reports its health inside the status line ("Up 2 hours (healthy)");
/// otherwise the lifecycle state ("running", "exited", ...) stands.
fn raw_state(container: &ContainerSnapshot) -> String {
    if container.status.contains("(healthy)") {
        "healthy".to_string()
    } else if container.status.contains("(unhealthy)") {
        "unhealthy".to_string()
    } else {
        container.state.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dockhand_common::{AgentError, HelperRun, HelperSpec};

    /// Scripted runtime: each sampling cycle pops the next container
    /// listing.
    struct ScriptedRuntime {
        listings: Mutex<Vec<Vec<ContainerSnapshot>>>,
    }

    impl ScriptedRuntime {
        fn new(mut listings: Vec<Vec<ContainerSnapshot>>) -> Arc<Self> {
            listings.reverse();
            Arc::new(Self {
                listings: Mutex::new(listings),
            })
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn list_containers(
            &self,
            _include_stopped: bool,
        ) -> dockhand_common::Result<Vec<ContainerSnapshot>> {
            self.listings
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::Runtime("listing script exhausted".to_string()))
        }

        async fn run_helper(&self, _spec: HelperSpec) -> dockhand_common::Result<HelperRun> {
            unimplemented!("monitor never runs helpers")
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(Severity, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, severity: Severity, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }

    fn container(name: &str, state: &str, status: &str) -> ContainerSnapshot {
        ContainerSnapshot {
            id: "c0ffee".to_string(),
            names: vec![format!("/{name}")],
            image: "nginx:1.27".to_string(),
            state: state.to_string(),
            status: status.to_string(),
            mounts: vec![],
        }
    }

    fn running(name: &str) -> ContainerSnapshot {
        container(name, "running", "Up 5 minutes")
    }

    fn exited(name: &str) -> ContainerSnapshot {
        container(name, "exited", "Exited (1) 10 seconds ago")
    }

    fn monitor(
        listings: Vec<Vec<ContainerSnapshot>>,
        retries: usize,
    ) -> (HealthMonitor, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = HealthMonitor::new(
            ScriptedRuntime::new(listings),
            notifier.clone(),
            MonitorConfig {
                interval: Duration::from_secs(60),
                retries,
            },
        );
        (monitor, notifier)
    }

    #[tokio::test]
    async fn startup_confirmation_is_silent() {
        let listings = vec![vec![running("web")]; 3];
        let (mut monitor, notifier) = monitor(listings, 3);

        for _ in 0..2 {
            monitor.sample_once().await.unwrap();
            assert_eq!(monitor.classification("web"), Some(MonitorState::Unknown));
        }
        monitor.sample_once().await.unwrap();

        assert_eq!(monitor.classification("web"), Some(MonitorState::Running));
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmed_outage_notifies_exactly_once() {
        let mut listings = vec![vec![running("web")]; 3];
        listings.extend(vec![vec![exited("web")]; 4]);
        let (mut monitor, notifier) = monitor(listings, 3);

        for _ in 0..5 {
            monitor.sample_once().await.unwrap();
        }
        // Five samples: [running x3, exited x2] — mixed window holds.
        assert_eq!(monitor.classification("web"), Some(MonitorState::Running));

        monitor.sample_once().await.unwrap();
        assert_eq!(monitor.classification("web"), Some(MonitorState::Exited));

        // A further all-down window must not alert again.
        monitor.sample_once().await.unwrap();
        assert_eq!(monitor.classification("web"), Some(MonitorState::Exited));

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Severity::Error);
        assert!(messages[0].1.contains("web is exited"));
    }

    #[tokio::test]
    async fn recovery_after_outage_notifies_once() {
        let mut listings = vec![vec![exited("web")]; 3];
        listings.extend(vec![vec![running("web")]; 3]);
        let (mut monitor, notifier) = monitor(listings, 3);

        for _ in 0..3 {
            monitor.sample_once().await.unwrap();
        }
        assert_eq!(monitor.classification("web"), Some(MonitorState::Exited));

        for _ in 0..3 {
            monitor.sample_once().await.unwrap();
        }
        assert_eq!(monitor.classification("web"), Some(MonitorState::Running));

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].0, Severity::Info);
        assert!(messages[1].1.contains("web is UP and running again"));
    }

    #[tokio::test]
    async fn health_status_overrides_lifecycle_state() {
        let unhealthy = container("web", "running", "Up 2 hours (unhealthy)");
        let listings = vec![vec![unhealthy]; 3];
        let (mut monitor, notifier) = monitor(listings, 3);

        for _ in 0..3 {
            monitor.sample_once().await.unwrap();
        }

        assert_eq!(monitor.classification("web"), Some(MonitorState::Unhealthy));
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("web is unhealthy"));
    }

    #[tokio::test]
    async fn removed_containers_are_forgotten() {
        let listings = vec![vec![running("web")], vec![], vec![running("web")]];
        let (mut monitor, _notifier) = monitor(listings, 3);

        monitor.sample_once().await.unwrap();
        assert!(monitor.classification("web").is_some());

        monitor.sample_once().await.unwrap();
        assert!(monitor.classification("web").is_none());

        // Back again: history restarts from scratch.
        monitor.sample_once().await.unwrap();
        assert_eq!(monitor.classification("web"), Some(MonitorState::Unknown));
    }

    #[tokio::test]
    async fn failed_cycle_surfaces_the_error() {
        let (mut monitor, _notifier) = monitor(vec![], 3);
        assert!(monitor.sample_once().await.is_err());
    }
}
