pub mod circuit;
pub mod settings;
pub mod storage;

pub use circuit::{CircuitConfig, CircuitOverrides, WriteMode};
pub use settings::Settings;
pub use storage::{FileStoreConfig, RedisStoreConfig, StorageConfig};

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    ValidationError(String),

    #[error("unknown storage backend `{0}`")]
    UnknownBackend(String),

    #[error("unknown circuit configuration group `{0}`")]
    UnknownGroup(String),
}

/// Semantic checks run once after deserialization
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Fully defaulted instance, used when no configuration source is present
pub trait WithDefaults {
    fn with_defaults() -> Self;
}

/// Load the settings from files and environment variables
pub fn load() -> Result<Settings, ConfigError> {
    settings::load_settings()
}
