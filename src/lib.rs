#![deny(warnings)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod store;

// Re-export commonly used types for convenience
pub use crate::config::{CircuitConfig, Settings, WriteMode};
pub use crate::error::{Error, Result};
pub use crate::resilience::{CircuitBreaker, CircuitState, Registry, StateOverrides};
pub use crate::store::{Backends, FileStore, MemoryStore, StateStore, StoreError};
