//! # Archiver Configuration
//!
//! Typed configuration for the archiving core. Values are layered by
//! [`ConfigManager`]: environment defaults, then an optional YAML file, then
//! `ARCHIVER_*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use archiver_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ladder = manager.config().retry.ladder();
//! println!("{} attempts before giving up", ladder.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::orchestration::backoff::RetryLadder;

/// Delays used in production, in seconds. One attempt per element.
pub const PRODUCTION_RETRY_DELAYS_SECONDS: [u64; 5] = [5, 25, 60, 120, 600];

/// Same attempt count as production without the wall-clock wait.
pub const TEST_RETRY_DELAYS_SECONDS: [u64; 5] = [0, 0, 0, 0, 0];

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArchiverConfig {
    /// Deployment environment (development, test, production)
    pub environment: String,

    /// Message bus topic names
    pub topics: TopicsConfig,

    /// Retry ladder
    pub retry: RetryConfig,

    /// Per-call timeouts for remote collaborators
    pub timeouts: TimeoutsConfig,

    /// Command dispatch settings
    pub dispatch: DispatchConfig,

    /// Telemetry and monitoring settings
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TopicsConfig {
    pub input: String,
    pub processing: String,
    pub message: String,
    pub metrics: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            input: "privat-soknadInnsendt-v1-default".to_string(),
            processing: "privat-soknadInnsendt-processingEventLog-v1-default".to_string(),
            message: "privat-soknadInnsendt-messages-v1-default".to_string(),
            metrics: "privat-soknadInnsendt-metrics-v1-default".to_string(),
        }
    }
}

/// Backoff and retry configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Delay before each attempt; its length is the maximum number of attempts
    pub delays_seconds: Vec<u64>,
}

impl RetryConfig {
    pub fn for_environment(environment: &str) -> Self {
        let delays = if environment == "test" {
            TEST_RETRY_DELAYS_SECONDS
        } else {
            PRODUCTION_RETRY_DELAYS_SECONDS
        };
        Self {
            delays_seconds: delays.to_vec(),
        }
    }

    /// Build the immutable ladder the scheduler works from
    pub fn ladder(&self) -> RetryLadder {
        RetryLadder::from_seconds(&self.delays_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    pub fetch_ms: u64,
    pub delete_ms: u64,
    pub archive_ms: u64,
    pub publish_ms: u64,
}

impl TimeoutsConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_millis(self.fetch_ms)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_millis(self.delete_ms)
    }

    pub fn archive(&self) -> Duration {
        Duration::from_millis(self.archive_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_ms: 30_000,
            delete_ms: 10_000,
            archive_ms: 60_000,
            publish_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Capacity of the processor's command channel
    pub command_buffer_size: usize,
    /// Upper bound on how long shutdown waits for in-flight attempts
    pub shutdown_grace_ms: u64,
}

impl DispatchConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 1000,
            shutdown_grace_ms: 30_000,
        }
    }
}

/// Telemetry and monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "archiver-core".to_string(),
        }
    }
}

impl ArchiverConfig {
    /// Built-in defaults for an environment, before any file or env overrides
    pub fn for_environment(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            topics: TopicsConfig::default(),
            retry: RetryConfig::for_environment(environment),
            timeouts: TimeoutsConfig::default(),
            dispatch: DispatchConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    pub fn is_test(&self) -> bool {
        self.environment == "test"
    }

    /// Validate the loaded configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.environment.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "environment",
                "root configuration",
            ));
        }

        if self.retry.delays_seconds.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "retry.delays_seconds",
                "[]",
                "at least one attempt is required",
            ));
        }

        for (field, value) in [
            ("topics.input", &self.topics.input),
            ("topics.processing", &self.topics.processing),
            ("topics.message", &self.topics.message),
            ("topics.metrics", &self.topics.metrics),
        ] {
            if value.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "topics configuration",
                ));
            }
        }

        for (field, value) in [
            ("timeouts.fetch_ms", self.timeouts.fetch_ms),
            ("timeouts.delete_ms", self.timeouts.delete_ms),
            ("timeouts.archive_ms", self.timeouts.archive_ms),
            ("timeouts.publish_ms", self.timeouts.publish_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "timeout must be greater than 0",
                ));
            }
        }

        if self.dispatch.command_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.command_buffer_size",
                "0",
                "buffer size must be greater than 0",
            ));
        }

        Ok(())
    }
}
