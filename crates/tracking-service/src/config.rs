//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga_store::EPHEMERAL_URL;

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: saga storage target (default: `"sqlite::memory:"`)
/// - `CART_EXPIRY_SECS`: idle time before a cart expires (default: `600`)
/// - `CART_STATE_QUEUE`: queue carrying cart events (default: `"cart_state"`)
/// - `PUBLISH_MAX_RETRIES`: retries for republishing fired jobs (default: `5`)
/// - `CONFLICT_MAX_RETRIES`: retries for conflicting saga saves (default: `5`)
/// - `SCHEDULER_HISTORY_CAPACITY`: finished job statuses kept for lookup (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub cart_expiry: Duration,
    pub cart_state_queue: String,
    pub publish_max_retries: usize,
    pub conflict_max_retries: usize,
    pub scheduler_history_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed_var("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            cart_expiry: parsed_var("CART_EXPIRY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cart_expiry),
            cart_state_queue: std::env::var("CART_STATE_QUEUE")
                .unwrap_or(defaults.cart_state_queue),
            publish_max_retries: parsed_var("PUBLISH_MAX_RETRIES")
                .unwrap_or(defaults.publish_max_retries),
            conflict_max_retries: parsed_var("CONFLICT_MAX_RETRIES")
                .unwrap_or(defaults.conflict_max_retries),
            scheduler_history_capacity: parsed_var("SCHEDULER_HISTORY_CAPACITY")
                .unwrap_or(defaults.scheduler_history_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: EPHEMERAL_URL.to_string(),
            cart_expiry: saga::machine::DEFAULT_CART_EXPIRY,
            cart_state_queue: saga::machine::DEFAULT_CART_STATE_QUEUE.to_string(),
            publish_max_retries: 5,
            conflict_max_retries: 5,
            scheduler_history_capacity: scheduler::DEFAULT_HISTORY_CAPACITY,
        }
    }
}
