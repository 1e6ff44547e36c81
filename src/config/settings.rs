use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{CircuitConfig, CircuitOverrides, ConfigError, StorageConfig, Validate, WithDefaults};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Process-wide circuit defaults
    #[serde(default)]
    pub defaults: CircuitConfig,
    /// Storage backends
    #[serde(default)]
    pub storage: StorageConfig,
    /// Named configuration groups, each merged over `defaults`
    #[serde(default)]
    pub circuits: HashMap<String, CircuitOverrides>,
}

impl Settings {
    /// Resolve a named configuration group into a complete circuit config
    pub fn circuit_config(&self, group: &str) -> Result<CircuitConfig, ConfigError> {
        let overrides = self
            .circuits
            .get(group)
            .ok_or_else(|| ConfigError::UnknownGroup(group.to_string()))?;

        let config = self.defaults.merge(overrides);
        config.validate().map_err(|err| match err {
            ConfigError::ValidationError(message) => {
                ConfigError::ValidationError(format!("circuits.{}: {}", group, message))
            }
            other => other,
        })?;

        Ok(config)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.validate()?;
        self.storage.validate()?;
        for group in self.circuits.keys() {
            self.circuit_config(group)?;
        }
        Ok(())
    }
}

impl WithDefaults for Settings {
    fn with_defaults() -> Self {
        Self {
            defaults: CircuitConfig::with_defaults(),
            storage: StorageConfig::with_defaults(),
            circuits: HashMap::new(),
        }
    }
}

/// Load configuration from files and environment variables
///
/// Configuration loading follows this precedence (highest to lowest):
/// 1. Environment variables: CIRCUIT_BREAKER__DEFAULTS__FAIL_THRESHOLD=3
/// 2. config/local.toml (git-ignored, developer overrides)
/// 3. config/{APP_ENV}.toml (development/staging/production)
/// 4. config/default.toml (base defaults)
pub fn load_settings() -> Result<Settings, ConfigError> {
    use config::{Config, Environment, File};

    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(
            Environment::with_prefix("CIRCUIT_BREAKER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
