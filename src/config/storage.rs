use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{ConfigError, Validate, WithDefaults};
use crate::store::{DEFAULT_ENTRY_LIFETIME, DEFAULT_PREFIX};

/// Storage backend configuration
///
/// The memory backend is always available. The file and redis backends are
/// registered only when their section is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key prefix for namespace isolation
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Lifetime of stored entries in seconds
    #[serde(default = "default_entry_lifetime")]
    pub entry_lifetime: u64,
    #[serde(default)]
    pub file: Option<FileStoreConfig>,
    #[serde(default)]
    pub redis: Option<RedisStoreConfig>,
}

/// File backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding one file per circuit
    #[serde(default = "default_file_directory")]
    pub directory: PathBuf,
}

/// Redis backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_entry_lifetime() -> u64 {
    DEFAULT_ENTRY_LIFETIME
}

fn default_file_directory() -> PathBuf {
    PathBuf::from("storage/circuits")
}

fn default_redis_connection_timeout() -> u64 {
    3000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            entry_lifetime: default_entry_lifetime(),
            file: None,
            redis: None,
        }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            directory: default_file_directory(),
        }
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_lifetime == 0 {
            return Err(ConfigError::ValidationError("storage.entry_lifetime must be > 0".to_string()));
        }
        if let Some(file) = &self.file {
            file.validate()?;
        }
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }
}

impl Validate for FileStoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("storage.file.directory cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Validate for RedisStoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::ValidationError("storage.redis.url cannot be empty".to_string()));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ConfigError::ValidationError("storage.redis.url must start with redis:// or rediss://".to_string()));
        }
        if self.connection_timeout == 0 {
            return Err(ConfigError::ValidationError("storage.redis.connection_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

impl WithDefaults for StorageConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}
