//! Outbound notification sinks.
//!
//! Every notification is logged through tracing; Telegram delivery is
//! added when a bot token is configured and the severity clears the
//! configured threshold. Delivery problems are logged, never propagated.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use dockhand_common::{Notifier, Severity};

/// Threshold parsed from the `notify_level` config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Off,
    Min(Severity),
}

impl NotifyLevel {
    pub fn parse(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "none" => NotifyLevel::Off,
            "debug" => NotifyLevel::Min(Severity::Debug),
            "info" => NotifyLevel::Min(Severity::Info),
            "warn" => NotifyLevel::Min(Severity::Warn),
            "error" | "fatal" | "panic" => NotifyLevel::Min(Severity::Error),
            _ => NotifyLevel::Min(Severity::Info),
        }
    }

    pub fn allows(&self, severity: Severity) -> bool {
        match self {
            NotifyLevel::Off => false,
            NotifyLevel::Min(min) => severity >= *min,
        }
    }
}

pub struct AgentNotifier {
    threshold: NotifyLevel,
    telegram: Option<TelegramNotifier>,
}

impl AgentNotifier {
    pub fn new(threshold: NotifyLevel, telegram: Option<TelegramNotifier>) -> Self {
        Self { threshold, telegram }
    }
}

#[async_trait]
impl Notifier for AgentNotifier {
    async fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => debug!(target: "dockhand::notify", "{message}"),
            Severity::Info => info!(target: "dockhand::notify", "{message}"),
            Severity::Warn => warn!(target: "dockhand::notify", "{message}"),
            Severity::Error => error!(target: "dockhand::notify", "{message}"),
        }

        if self.threshold.allows(severity) {
            if let Some(telegram) = &self.telegram {
                telegram.send(message).await;
            }
        }
    }
}

/// Telegram Bot API sink fanning each message out to the configured
/// chats.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_ids: Vec<i64>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_ids,
        }
    }

    async fn send(&self, text: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        for chat_id in &self.chat_ids {
            let body = serde_json::json!({ "chat_id": chat_id, "text": text });
            match self.client.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(chat_id, status = %response.status(), "telegram rejected notification");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(chat_id, error = %e, "telegram delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_like_log_levels() {
        assert_eq!(NotifyLevel::parse("none"), NotifyLevel::Off);
        assert_eq!(NotifyLevel::parse("ERROR"), NotifyLevel::Min(Severity::Error));
        assert_eq!(NotifyLevel::parse("fatal"), NotifyLevel::Min(Severity::Error));
        // Unknown values default to info.
        assert_eq!(NotifyLevel::parse("verbose"), NotifyLevel::Min(Severity::Info));
    }

    #[test]
    fn threshold_gates_delivery() {
        let info = NotifyLevel::Min(Severity::Info);
        assert!(info.allows(Severity::Error));
        assert!(info.allows(Severity::Info));
        assert!(!info.allows(Severity::Debug));

        assert!(!NotifyLevel::Off.allows(Severity::Error));

        let error_only = NotifyLevel::Min(Severity::Error);
        assert!(error_only.allows(Severity::Error));
        assert!(!error_only.allows(Severity::Warn));
    }
}
