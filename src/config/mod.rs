#[allow(clippy::module_inception)]
pub mod config;

pub use self::config::{AppConfig, BalanceConfig, DatabaseConfig, ServerConfig};
