//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order of
//! increasing precedence:
//!
//! 1. Built-in defaults for the detected environment
//! 2. An optional YAML file (`config/archiver.yaml` unless a path is given)
//! 3. `ARCHIVER_*` environment variables, `__` separating nested keys
//!    (`ARCHIVER_RETRY__DELAYS_SECONDS=0,0,0`)

use super::error::{ConfigResult, ConfigurationError};
use super::ArchiverConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_CONFIG_FILE: &str = "config/archiver.yaml";
const ENV_PREFIX: &str = "ARCHIVER";
const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ArchiverConfig,
    environment: String,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_path_with_env(None, &environment)
    }

    /// Load configuration from a specific file with explicit environment
    ///
    /// Useful for tests that must not depend on process-wide variables.
    pub fn load_from_path_with_env(
        config_file: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        if !KNOWN_ENVIRONMENTS.contains(&environment) {
            return Err(ConfigurationError::UnknownEnvironment {
                environment: environment.to_string(),
            });
        }

        let config_file = config_file.or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });

        debug!(
            environment = environment,
            config_file = ?config_file,
            "Loading archiver configuration"
        );

        let config = Self::build(config_file.as_deref(), environment)?;
        config.validate()?;

        info!(
            environment = environment,
            attempts = config.retry.delays_seconds.len(),
            input_topic = %config.topics.input,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file,
        }))
    }

    /// Test configuration: zero-delay ladder, no file, no environment variables
    pub fn for_testing() -> Arc<ConfigManager> {
        Arc::new(ConfigManager {
            config: ArchiverConfig::for_environment("test"),
            environment: "test".to_string(),
            config_file: None,
        })
    }

    /// Wrap an already constructed configuration
    pub fn from_config(config: ArchiverConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            config_file: None,
        }))
    }

    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    fn build(config_file: Option<&Path>, environment: &str) -> ConfigResult<ArchiverConfig> {
        let defaults = Config::try_from(&ArchiverConfig::for_environment(environment))
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = config_file {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("retry.delays_seconds")
                .try_parsing(true),
        );

        let merged = builder.build().map_err(|e| {
            ConfigurationError::load_error(
                config_file
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "environment".to_string()),
                e,
            )
        })?;

        let mut config: ArchiverConfig = merged.try_deserialize()?;
        // The environment chosen by the caller always wins over file contents
        config.environment = environment.to_string();
        Ok(config)
    }

    fn detect_environment() -> String {
        env::var("ARCHIVER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
