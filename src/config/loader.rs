//! Configuration Loader
//!
//! Environment-aware configuration loading. Reads `hint-sync.yaml`, merges the section named
//! after the active environment over the base values, applies the database URL from the
//! process environment and validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::SyncConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration file name looked up in the config directory
pub const CONFIG_FILE_NAME: &str = "hint-sync.yaml";

const ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: SyncConfig,
    environment: String,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// Falls back to built-in defaults when no configuration file can be found.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        match Self::default_config_directory() {
            Some(directory) => Self::load_from_directory_with_env(&directory, &environment),
            None => {
                warn!(
                    environment = %environment,
                    "No {CONFIG_FILE_NAME} found, using built-in defaults"
                );
                let mut config = SyncConfig::default();
                Self::apply_database_url_override(&mut config, Self::database_url_from_env());
                config.validate()?;
                Ok(Arc::new(ConfigManager {
                    config,
                    environment,
                    config_file: None,
                }))
            }
        }
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_file = config_directory.join(CONFIG_FILE_NAME);
        if !config_file.is_file() {
            return Err(ConfigurationError::config_file_not_found(vec![config_file]));
        }

        debug!(
            environment = environment,
            file = %config_file.display(),
            "Loading configuration"
        );

        let yaml_content = std::fs::read_to_string(&config_file).map_err(|e| {
            ConfigurationError::file_read_error(config_file.display().to_string(), e)
        })?;
        let mut config = Self::parse_with_environment(
            &yaml_content,
            environment,
            &config_file.display().to_string(),
        )?;
        Self::apply_database_url_override(&mut config, Self::database_url_from_env());
        config.validate()?;

        info!(
            environment = environment,
            database = %config.database.redacted_url(),
            queue = %config.queue.name,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file: Some(config_file),
        }))
    }

    /// Parse YAML content and merge the `environment` section over the base values
    pub fn parse_with_environment(
        yaml_content: &str,
        environment: &str,
        source: &str,
    ) -> ConfigResult<SyncConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(source, e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(environment = environment, "Applying environment-specific overrides");
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        // Environment sections are not part of the config struct
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for name in ENVIRONMENTS {
                map.remove(YamlValue::String(name.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source,
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Replace the configured database URL when the environment provides one
    pub fn apply_database_url_override(config: &mut SyncConfig, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            debug!("Database URL taken from environment");
            config.database.url = url;
        }
    }

    fn database_url_from_env() -> Option<String> {
        env::var("HINT_SYNC_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("HINT_SYNC_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> Option<PathBuf> {
        if let Ok(dir) = env::var("HINT_SYNC_CONFIG_DIR") {
            return Some(PathBuf::from(dir));
        }

        [PathBuf::from("config"), PathBuf::from("../config")]
            .into_iter()
            .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}
