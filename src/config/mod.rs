//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CHAT_RELAY` prefix and nested values use double underscores as separators.
//! Every value has a default, so an empty environment yields a working relay.
//!
//! # Example
//!
//! ```no_run
//! use chat_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Relay listening on {}", config.server.socket_addr().unwrap());
//! ```

mod error;
mod relay;
mod server;

pub use error::{ConfigError, ValidationError};
pub use relay::{
    ping_period_for, RelayConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PONG_WAIT_SECS,
    DEFAULT_WRITE_TIMEOUT_SECS,
};
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Relay configuration (pump timing, queues, fan-out policy)
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CHAT_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CHAT_RELAY__SERVER__PORT=9000` -> `server.port = 9000`
    /// - `CHAT_RELAY__RELAY__ECHO_POLICY=include_sender` -> `relay.echo_policy`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHAT_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relay::EchoPolicy;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear environment variables after testing
    fn clear_env() {
        env::remove_var("CHAT_RELAY__SERVER__PORT");
        env::remove_var("CHAT_RELAY__SERVER__ENVIRONMENT");
        env::remove_var("CHAT_RELAY__SERVER__LOG_FORMAT");
        env::remove_var("CHAT_RELAY__RELAY__ECHO_POLICY");
        env::remove_var("CHAT_RELAY__RELAY__PONG_WAIT_SECS");
        env::remove_var("CHAT_RELAY__RELAY__MAX_CONSECUTIVE_DECODE_FAILURES");
    }

    #[test]
    fn test_load_with_empty_environment_uses_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.max_message_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CHAT_RELAY__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.environment, Environment::Production);
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CHAT_RELAY__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_relay_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CHAT_RELAY__RELAY__ECHO_POLICY", "include_sender");
        env::set_var("CHAT_RELAY__RELAY__PONG_WAIT_SECS", "30");
        env::set_var("CHAT_RELAY__RELAY__MAX_CONSECUTIVE_DECODE_FAILURES", "5");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.relay.echo_policy, EchoPolicy::IncludeSender);
        assert_eq!(config.relay.pong_wait_secs, 30);
        assert_eq!(config.relay.max_consecutive_decode_failures, Some(5));
    }

    #[test]
    fn test_json_log_format() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CHAT_RELAY__SERVER__LOG_FORMAT", "json");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().server.log_format, LogFormat::Json);
    }
}
