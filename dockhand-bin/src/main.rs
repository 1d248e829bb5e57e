use std::path::Path;
use std::time::Duration;

use chrono::Local;
use color_eyre::eyre::{self, eyre};
use tokio::sync::watch;
use tracing::{error, info, warn};

use dockhand_common::Severity;
use dockhand_lib::{AgentConfig, AgentContext};
use dockhand_monitor::{HealthMonitor, MonitorConfig};
use dockhand_orchestrator::{BackupConfig, BackupError, BackupOrchestrator, RunSummary};

mod scheduler;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting dockhand agent");

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "./config/config.json".to_string());
    let config = AgentConfig::load(Path::new(&config_path))?;

    if !config.enable_backup && !config.enable_monitor {
        warn!("backup and monitor are both disabled, edit the config file and restart");
        return Ok(());
    }
    if !config.enable_backup {
        warn!("backup functionality is disabled");
    }
    if !config.enable_monitor {
        warn!("monitor functionality is disabled");
    }

    let context = AgentContext::new(config)?;
    let config = context.config.clone();

    if config.self_test_on_startup {
        context.self_test().await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut monitor_handle = None;
    if config.enable_monitor {
        let monitor = HealthMonitor::new(
            context.runtime.clone(),
            context.notifier.clone(),
            MonitorConfig {
                interval: Duration::from_secs(config.monitor_interval_seconds),
                retries: config.monitor_retries,
            },
        );
        monitor_handle = Some(tokio::spawn(monitor.run(shutdown_rx.clone())));
    }
    drop(shutdown_rx);

    let orchestrator =
        BackupOrchestrator::new(context.runtime.clone(), backup_config(&config));

    let mut last_run: Option<String> = None;
    if config.enable_backup && config.backup_on_startup {
        info!("running backup on startup");
        match run_backup(&orchestrator, &context).await {
            Ok(_) => last_run = Some(scheduler::hour_key(Local::now())),
            // Without the monitor there is nothing left for the process
            // to do after a failed run.
            Err(e) if !config.enable_monitor => return Err(eyre!(e)),
            Err(_) => {}
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !config.enable_backup {
                    continue;
                }
                let now = Local::now();
                if scheduler::due(now, &config.backup_hours, last_run.as_deref()) {
                    last_run = Some(scheduler::hour_key(now));
                    if let Err(e) = run_backup(&orchestrator, &context).await {
                        if !config.enable_monitor {
                            return Err(eyre!(e));
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = monitor_handle {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_backup(
    orchestrator: &BackupOrchestrator,
    context: &AgentContext,
) -> Result<RunSummary, BackupError> {
    match orchestrator.run().await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            error!(error = %e, "backup run failed");
            context
                .notifier
                .notify(Severity::Error, &format!("backup run failed: {e}"))
                .await;
            Err(e)
        }
    }
}

fn backup_config(config: &AgentConfig) -> BackupConfig {
    BackupConfig {
        backup_root: config.backup_path.clone(),
        logs_path: config.logs_path.clone(),
        retention_hours: config.retention_hours,
        concurrent_containers: config.concurrent_backup_containers,
        management_marker: config.management_name_marker.clone(),
        helper_image: config.helper_image.clone(),
        before_backup_cmd: non_empty(&config.before_backup_cmd),
        after_backup_cmd: non_empty(&config.after_backup_cmd),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
