//! # Configuration Management
//!
//! Centralized configuration for the transport library.
//!
//! This module provides structured configuration for sessions, callback
//! dispatch, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides
//!
//! ## Security Considerations
//! - Receive deadlines and the minimum sustained byte rate defend against
//!   slowloris-style peers that trickle a packet forever
//! - Packet size is bounded by the wire-level
//!   [`MAX_PACKET_SIZE`](crate::core::packet::MAX_PACKET_SIZE), not by
//!   configuration

use crate::error::{Result, TransportError};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TransportConfig {
    /// Session-specific configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Callback dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TransportConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| TransportError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| TransportError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| TransportError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(deadline) = std::env::var("SECURE_TRANSPORT_RECEIVE_TIMEOUT_MS") {
            if let Ok(val) = deadline.parse::<u64>() {
                config.session.receive_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(deadline) = std::env::var("SECURE_TRANSPORT_SEND_TIMEOUT_MS") {
            if let Ok(val) = deadline.parse::<u64>() {
                config.session.send_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(rate) = std::env::var("SECURE_TRANSPORT_MIN_RECEIVE_RATE") {
            if let Ok(val) = rate.parse::<u64>() {
                config.session.min_receive_rate = val;
            }
        }

        if let Ok(catch) = std::env::var("SECURE_TRANSPORT_CATCH_APP_EXCEPTIONS") {
            if let Ok(val) = catch.parse::<bool>() {
                config.dispatch.catch_application_exceptions = val;
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

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.session.validate());
        errors.extend(self.dispatch.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Session-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Maximum wait for a complete inbound packet
    #[serde(with = "duration_serde")]
    pub receive_timeout: Duration,

    /// Maximum wait for an outbound packet to flush
    #[serde(with = "duration_serde")]
    pub send_timeout: Duration,

    /// Minimum sustained receive rate in bytes per second; peers below it
    /// are treated as timed out by the I/O layer
    pub min_receive_rate: u64,

    /// Interval for keepalive probes
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_timeout: timeout::DEFAULT_TIMEOUT,
            send_timeout: timeout::DEFAULT_TIMEOUT,
            min_receive_rate: 1024,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.receive_timeout.as_millis() < 100 {
            errors.push("Receive timeout too short (minimum: 100ms)".to_string());
        } else if self.receive_timeout.as_secs() > 300 {
            errors.push("Receive timeout too long (maximum: 300s)".to_string());
        }

        if self.send_timeout.as_millis() < 100 {
            errors.push("Send timeout too short (minimum: 100ms)".to_string());
        }

        if self.min_receive_rate == 0 {
            errors.push("Minimum receive rate must be greater than 0".to_string());
        }

        if self.keepalive_interval.as_millis() < 100 {
            errors.push("Keepalive interval too short (minimum: 100ms)".to_string());
        } else if self.keepalive_interval.as_secs() > 3600 {
            errors.push("Keepalive interval too long (maximum: 1 hour)".to_string());
        }

        errors
    }
}

/// Callback dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Idle-sleep delay between dispatcher ticks when no work was queued
    #[serde(with = "duration_serde")]
    pub idle_delay: Duration,

    /// Catch exceptions escaping application callbacks and report them,
    /// closing the connection gracefully; when false they propagate as a
    /// fatal, process-visible error
    pub catch_application_exceptions: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(10),
            catch_application_exceptions: true,
        }
    }
}

impl DispatchConfig {
    /// Validate dispatch configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.idle_delay.is_zero() {
            errors.push("Dispatcher idle delay must be greater than 0".to_string());
        } else if self.idle_delay.as_millis() > 1000 {
            errors.push("Dispatcher idle delay too long (maximum: 1s)".to_string());
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
            app_name: String::from("secure-transport"),
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
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
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
