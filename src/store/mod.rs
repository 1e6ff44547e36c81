//! Durable storage for circuit state.
//!
//! A [`StateStore`] persists one [`CircuitState`] per circuit name. Backends
//! differ only in visibility and durability:
//!
//! - [`MemoryStore`]: process-local, lost on restart
//! - [`FileStore`]: survives restarts, shared by processes on one machine
//! - `RedisStore`: shared across machines (feature `redis-cache`)
//!
//! [`Backends`] maps configured backend identifiers to store instances.

mod backends;
mod file;
mod memory;
#[cfg(feature = "redis-cache")]
mod redis;

pub use backends::{Backends, FILE_BACKEND, NATIVE_BACKEND, REDIS_BACKEND};
pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis-cache")]
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::resilience::CircuitState;

/// Default key prefix for persisted circuit state
pub const DEFAULT_PREFIX: &str = "cb_";

/// Default lifetime of a stored entry in seconds. Long enough that live state
/// is only ever replaced, never evicted.
pub const DEFAULT_ENTRY_LIFETIME: u64 = 999_999;

/// Failure of a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode circuit state: {0}")]
    Codec(#[from] bincode::Error),

    #[cfg(feature = "redis-cache")]
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value persistence for circuit state, keyed by circuit name
#[async_trait]
pub trait StateStore: Send + Sync + Debug {
    /// Persist `state` for `circuit`, replacing any previous value
    async fn save(&self, circuit: &str, state: &CircuitState) -> Result<(), StoreError>;

    /// Most recently saved state for `circuit`
    ///
    /// Returns None if nothing was saved or the entry has expired
    async fn load(&self, circuit: &str) -> Result<Option<CircuitState>, StoreError>;
}

/// Builder for namespaced store keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKey {
    prefix: String,
}

impl StoreKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full key for a circuit name
    pub fn build(&self, circuit: &str) -> String {
        format!("{}{}", self.prefix, circuit)
    }
}

impl Default for StoreKey {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
