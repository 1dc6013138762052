//! Domain types, configuration, and error layers shared by the minion crates.

pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AgentConfig, AppConfig, ConfigError, LlmProvider, LoadOptions, ReplyConfig};
pub use domain::agent::{normalize_label, AgentId};
pub use domain::conversation::{Conversation, Role, Turn};
pub use domain::session::SessionId;
pub use errors::{ApplicationError, ConfigurationError, DomainError, InterfaceError};
