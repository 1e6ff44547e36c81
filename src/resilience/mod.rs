//! Circuit breaker state machine and registry
//!
//! - [`CircuitState`]: the persisted value and its transition rules
//! - [`CircuitBreaker`]: one named circuit, writing every transition through
//!   to a [`StateStore`](crate::store::StateStore)
//! - [`Registry`]: shares one circuit per `(name, config)` pair
//! - [`Clock`]: time source for cool-down decisions

mod circuit_breaker;
mod clock;
mod registry;
mod state;

pub use circuit_breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::Registry;
pub use state::{
    CircuitState, FieldValue, Phase, StateField, StateOverrides, Timestamp, UnknownField,
};
