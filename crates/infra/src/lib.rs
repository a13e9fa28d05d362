//! Infrastructure layer: configuration, database and messaging adapters.

pub mod config;
pub mod data_access;
pub mod messaging;

pub use config::{AppConfig, ConfigError, WhatsAppConfig};
pub use data_access::{InMemoryDataAccess, PgDataAccess};
pub use messaging::{LogOnlySender, WhatsAppSender};
