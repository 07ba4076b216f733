//! Configuration module.
//!
//! JSON config file merged over compiled defaults, then environment
//! overrides: `SKETCHPARTY__`-prefixed nested variables plus the flat
//! operational knobs (`ROUND_SECONDS`, `MAX_ROUNDS`, ...).
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`game`]: Round pacing, chat limiter, kick voting, history limits
//! - [`storage`]: KV TTLs and distributed lock tuning
//! - [`security`]: Bearer-token settings
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod game;
pub mod loader;
pub mod logging;
pub mod security;
pub mod storage;
pub mod types;

pub use game::GameConfig;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use security::AuthConfig;

pub use storage::StorageConfig;

pub use types::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8430);
        assert_eq!(config.cors_origins, "*");

        assert_eq!(config.game.round_seconds, 120);
        assert_eq!(config.game.max_rounds, 10);
        assert_eq!(config.game.max_players, 8);
        assert_eq!(config.game.chat_window_seconds, 4);
        assert_eq!(config.game.chat_max_burst, 3);
        assert_eq!(config.game.max_chat_cooldown, 12);
        assert_eq!(config.game.disconnect_grace_seconds, 60);
        assert_eq!(config.game.round_break_seconds, 5);
        assert_eq!(config.game.kick_vote_seconds, 20);
        assert_eq!(config.game.chat_history_limit, 500);
        assert_eq!(config.game.draw_history_limit, 2000);

        assert_eq!(config.storage.room_state_ttl_seconds, 86_400);
        assert_eq!(config.storage.room_history_ttl_seconds, 604_800);
        assert_eq!(config.storage.timer_owner_grace_seconds, 15);
        assert_eq!(config.storage.lock_timeout_seconds, 10);
        assert_eq!(config.storage.lock_wait_seconds, 5);

        assert_eq!(config.auth.access_cookie, "access_token");

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.game.round_seconds, deserialized.game.round_seconds);
        assert_eq!(
            config.storage.room_state_ttl_seconds,
            deserialized.storage.room_state_ttl_seconds
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
