//! Root configuration types.

use super::defaults::{default_cors_origins, default_port};
use super::game::GameConfig;
use super::logging::LoggingConfig;
use super::security::AuthConfig;
use super::storage::StorageConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated allowed origins, or "*" for permissive CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: default_cors_origins(),
            game: GameConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
