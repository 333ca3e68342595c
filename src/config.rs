//! # Configuration Management
//!
//! Centralized configuration for the link layer.
//!
//! This module provides structured configuration for the buffer pool, the
//! reliability engine of socket-backed connections, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Sizing Considerations
//! - Default buffer size (1300 bytes) keeps datagrams under a typical path MTU
//! - `start_pool_size` must not exceed `max_pool_size`
//! - Resend interval should stay well below the disconnect timeout

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default bytes per pooled buffer
pub const DEFAULT_BUFFER_SIZE: usize = 1300;

/// Default number of buffers allocated when a pool is created
pub const DEFAULT_START_POOL_SIZE: usize = 100;

/// Default upper bound on idle pooled buffers
pub const DEFAULT_MAX_POOL_SIZE: usize = 5000;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LinkConfig {
    /// Buffer pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Reliability engine configuration
    #[serde(default)]
    pub reliability: ReliabilityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| LinkError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| LinkError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| LinkError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("PEER_LINK_BUFFER_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.pool.buffer_size = val;
            }
        }

        if let Ok(size) = std::env::var("PEER_LINK_START_POOL_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.pool.start_pool_size = val;
            }
        }

        if let Ok(size) = std::env::var("PEER_LINK_MAX_POOL_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.pool.max_pool_size = val;
            }
        }

        if let Ok(clear) = std::env::var("PEER_LINK_CLEAR_ON_TAKE") {
            if let Ok(val) = clear.parse::<bool>() {
                config.pool.clear_on_take = val;
            }
        }

        if let Ok(timeout) = std::env::var("PEER_LINK_DISCONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.reliability.disconnect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(interval) = std::env::var("PEER_LINK_RESEND_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.reliability.resend_interval = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LinkError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| LinkError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.pool.validate());
        errors.extend(self.reliability.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LinkError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Bytes per buffer, fixed for the pool's lifetime
    pub buffer_size: usize,

    /// Buffers allocated when the pool is created
    pub start_pool_size: usize,

    /// Upper bound on idle buffers kept for reuse
    pub max_pool_size: usize,

    /// Zero buffers when they are handed out
    #[serde(default)]
    pub clear_on_take: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            start_pool_size: DEFAULT_START_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            clear_on_take: false,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.buffer_size == 0 {
            errors.push("Buffer size must be greater than 0".to_string());
        } else if self.buffer_size > 64 * 1024 {
            errors.push(format!(
                "Buffer size too large: {} bytes (maximum datagram: 65536)",
                self.buffer_size
            ));
        }

        if self.start_pool_size > self.max_pool_size {
            errors.push(format!(
                "Start pool size ({}) must not exceed max pool size ({})",
                self.start_pool_size, self.max_pool_size
            ));
        }

        if self.max_pool_size == 0 {
            errors.push("Max pool size must be greater than 0".to_string());
        } else if self.max_pool_size > 1_000_000 {
            errors.push(format!(
                "Max pool size too large: {} (max recommended: 1,000,000)",
                self.max_pool_size
            ));
        }

        errors
    }
}

/// Reliability engine configuration for socket-backed connections
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReliabilityConfig {
    /// Delay before an unacknowledged reliable packet is sent again
    #[serde(with = "duration_serde")]
    pub resend_interval: Duration,

    /// Resends of one packet before the connection is dropped
    pub max_resend_attempts: u32,

    /// Time after which an unacknowledged notify send is reported lost
    #[serde(with = "duration_serde")]
    pub notify_timeout: Duration,

    /// Silence after which the connection is dropped
    #[serde(with = "duration_serde")]
    pub disconnect_timeout: Duration,

    /// Idle time after which a keep-alive is sent
    #[serde(with = "duration_serde")]
    pub keep_alive_interval: Duration,

    /// Maximum reliable packets in flight, also the receive reorder window
    pub reliable_window: u16,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(200),
            max_resend_attempts: 10,
            notify_timeout: Duration::from_secs(1),
            disconnect_timeout: Duration::from_secs(30),
            keep_alive_interval: Duration::from_secs(1),
            reliable_window: 64,
        }
    }
}

impl ReliabilityConfig {
    /// Validate reliability configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.resend_interval.as_millis() < 10 {
            errors.push("Resend interval too short (minimum: 10ms)".to_string());
        } else if self.resend_interval >= self.disconnect_timeout {
            errors.push("Resend interval must be shorter than disconnect timeout".to_string());
        }

        if self.max_resend_attempts == 0 {
            errors.push("Max resend attempts must be greater than 0".to_string());
        }

        if self.notify_timeout.as_millis() < 10 {
            errors.push("Notify timeout too short (minimum: 10ms)".to_string());
        }

        if self.disconnect_timeout.as_millis() < 100 {
            errors.push("Disconnect timeout too short (minimum: 100ms)".to_string());
        } else if self.disconnect_timeout.as_secs() > 300 {
            errors.push("Disconnect timeout too long (maximum: 300s)".to_string());
        }

        if self.keep_alive_interval >= self.disconnect_timeout {
            errors.push("Keep-alive interval must be shorter than disconnect timeout".to_string());
        }

        if self.reliable_window == 0 {
            errors.push("Reliable window must be greater than 0".to_string());
        } else if self.reliable_window > u16::MAX / 2 {
            errors.push(format!(
                "Reliable window too large: {} (maximum: {})",
                self.reliable_window,
                u16::MAX / 2
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("peer-link"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
