//! Crate-level error type.
//!
//! An open circuit is never an error. Errors surface only while building
//! circuits (bad configuration, unknown backend) or from direct store use.

use crate::config::ConfigError;
use crate::store::StoreError;

/// Result alias for circuit construction and store access
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Circuit cannot be built from the supplied configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Storage backend could not be reached or returned bad data
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
