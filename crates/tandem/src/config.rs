//! Gateway configuration.
//!
//! Loaded from environment variables. Durations are whole seconds.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tandem_pairing::PairingConfig;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9092";

/// Default heartbeat timeout in seconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECONDS: u64 = 15;

/// Default queue timeout in seconds.
pub const DEFAULT_QUEUE_TIMEOUT_SECONDS: u64 = 60;

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 10;

/// Default time a new connection has to send `Hello`.
pub const DEFAULT_HELLO_TIMEOUT_SECONDS: u64 = 5;

const BIND_ADDRESS: &str = "TANDEM_BIND_ADDRESS";
const HEARTBEAT_TIMEOUT: &str = "TANDEM_HEARTBEAT_TIMEOUT_SECONDS";
const QUEUE_TIMEOUT: &str = "TANDEM_QUEUE_TIMEOUT_SECONDS";
const SWEEP_INTERVAL: &str = "TANDEM_SWEEP_INTERVAL_SECONDS";
const HELLO_TIMEOUT: &str = "TANDEM_HELLO_TIMEOUT_SECONDS";

/// Errors from loading [`ServerConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but its value is unusable.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Name of the environment variable.
        key: String,
        /// The raw value as found.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Process-level configuration for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_address: String,

    /// Timeouts handed to the pairing coordinator.
    pub pairing: PairingConfig,

    /// How long a new connection may take to send `Hello`.
    pub hello_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            pairing: PairingConfig::default(),
            hello_timeout: Duration::from_secs(DEFAULT_HELLO_TIMEOUT_SECONDS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get(BIND_ADDRESS)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        if bind_address.trim().is_empty() {
            return Err(invalid(BIND_ADDRESS, &bind_address, "must not be empty"));
        }

        let pairing = PairingConfig {
            heartbeat_timeout: seconds(
                vars,
                HEARTBEAT_TIMEOUT,
                DEFAULT_HEARTBEAT_TIMEOUT_SECONDS,
            )?,
            queue_timeout: seconds(vars, QUEUE_TIMEOUT, DEFAULT_QUEUE_TIMEOUT_SECONDS)?,
            sweep_interval: seconds(
                vars,
                SWEEP_INTERVAL,
                DEFAULT_SWEEP_INTERVAL_SECONDS,
            )?,
        };
        let hello_timeout = seconds(vars, HELLO_TIMEOUT, DEFAULT_HELLO_TIMEOUT_SECONDS)?;

        Ok(Self {
            bind_address,
            pairing,
            hello_timeout,
        })
    }

    /// Interval clients are asked to heartbeat at: a third of the heartbeat
    /// timeout, so two lost heartbeats still leave the caller alive.
    pub fn heartbeat_interval(&self) -> Duration {
        self.pairing.heartbeat_timeout / 3
    }
}

/// Parses a whole number of seconds between 1 and one year, falling back
/// to `default` when the variable is unset.
fn seconds(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(Duration::from_secs(default));
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(key, raw, "not a whole number of seconds"))?;
    if secs == 0 {
        return Err(invalid(key, raw, "must be greater than zero"));
    }
    if secs > PairingConfig::MAX_DURATION.as_secs() {
        return Err(invalid(key, raw, "out of range, must be at most one year"));
    }
    Ok(Duration::from_secs(secs))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
