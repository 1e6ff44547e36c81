use serde::{Deserialize, Serialize};

use super::{ConfigError, Validate, WithDefaults};

/// Backend identifier of the process-local store
pub const MEMORY_BACKEND: &str = "memory";

/// How a transition reaches the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// The reporting call waits for the store write
    #[default]
    Blocking,
    /// A background task persists the latest state; callers never wait
    Detached,
}

/// Immutable parameters of one circuit
///
/// Two configs that compare equal address the same shared circuit for a
/// given name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,
    /// Seconds the circuit stays open before a probe is allowed
    #[serde(default = "default_open_duration", alias = "ttl")]
    pub open_duration: u64,
    /// Identifier of the storage backend
    #[serde(default = "default_storage_backend", alias = "driver")]
    pub storage_backend: String,
    #[serde(default)]
    pub write_mode: WriteMode,
}

/// Partial circuit configuration, merged over process-wide defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitOverrides {
    #[serde(default)]
    pub fail_threshold: Option<u32>,
    #[serde(default, alias = "ttl")]
    pub open_duration: Option<u64>,
    #[serde(default, alias = "driver")]
    pub storage_backend: Option<String>,
    #[serde(default)]
    pub write_mode: Option<WriteMode>,
}

fn default_fail_threshold() -> u32 {
    5
}

fn default_open_duration() -> u64 {
    300 // 5 minutes
}

fn default_storage_backend() -> String {
    MEMORY_BACKEND.to_string()
}

impl CircuitConfig {
    pub fn with_fail_threshold(mut self, fail_threshold: u32) -> Self {
        self.fail_threshold = fail_threshold;
        self
    }

    pub fn with_open_duration(mut self, seconds: u64) -> Self {
        self.open_duration = seconds;
        self
    }

    pub fn with_storage_backend(mut self, backend: impl Into<String>) -> Self {
        self.storage_backend = backend.into();
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Fill every field the overrides leave unset from `self`
    pub fn merge(&self, overrides: &CircuitOverrides) -> CircuitConfig {
        CircuitConfig {
            fail_threshold: overrides.fail_threshold.unwrap_or(self.fail_threshold),
            open_duration: overrides.open_duration.unwrap_or(self.open_duration),
            storage_backend: overrides
                .storage_backend
                .clone()
                .unwrap_or_else(|| self.storage_backend.clone()),
            write_mode: overrides.write_mode.unwrap_or(self.write_mode),
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            fail_threshold: default_fail_threshold(),
            open_duration: default_open_duration(),
            storage_backend: default_storage_backend(),
            write_mode: WriteMode::default(),
        }
    }
}

impl Validate for CircuitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fail_threshold == 0 {
            return Err(ConfigError::ValidationError("circuit.fail_threshold must be > 0".to_string()));
        }
        if self.open_duration == 0 {
            return Err(ConfigError::ValidationError("circuit.open_duration must be > 0".to_string()));
        }
        if self.storage_backend.trim().is_empty() {
            return Err(ConfigError::ValidationError("circuit.storage_backend cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl WithDefaults for CircuitConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}
