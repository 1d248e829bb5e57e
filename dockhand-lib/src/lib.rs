//! Configuration, context and notification plumbing for the dockhand
//! agent binary.

pub mod config;
pub mod context;
pub mod notify;

pub use config::{AgentConfig, ConfigError};
pub use context::AgentContext;
pub use notify::{AgentNotifier, NotifyLevel, TelegramNotifier};
