//! Circuit breaker metrics.
//!
//! Recorded through the `metrics` facade. Without an installed recorder the
//! calls are no-ops; exporting is up to the host process.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::Once;

use crate::resilience::Phase;

pub const FAILURES_TOTAL: &str = "circuit_breaker_failures_total";
pub const SUCCESSES_TOTAL: &str = "circuit_breaker_successes_total";
pub const TRANSITIONS_TOTAL: &str = "circuit_breaker_transitions_total";
pub const OPEN: &str = "circuit_breaker_open";
pub const STORE_ERRORS_TOTAL: &str = "circuit_breaker_store_errors_total";

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder
pub fn describe() {
    DESCRIBE.call_once(|| {
        describe_counter!(FAILURES_TOTAL, "Total number of failed calls reported to a circuit");
        describe_counter!(SUCCESSES_TOTAL, "Total number of successful calls reported to a circuit");
        describe_counter!(TRANSITIONS_TOTAL, "Total number of circuit state transitions");
        describe_gauge!(OPEN, "Whether the circuit is open (1) or closed (0)");
        describe_counter!(STORE_ERRORS_TOTAL, "Total number of failed state store operations");
    });
}

pub fn record_failure(circuit: &str) {
    counter!(FAILURES_TOTAL, "circuit" => circuit.to_string()).increment(1);
}

pub fn record_success(circuit: &str) {
    counter!(SUCCESSES_TOTAL, "circuit" => circuit.to_string()).increment(1);
}

pub fn record_transition(circuit: &str, to: Phase) {
    let label = match to {
        Phase::Closed => "closed",
        Phase::Open => "open",
        Phase::HalfOpen => "half_open",
    };
    counter!(TRANSITIONS_TOTAL, "circuit" => circuit.to_string(), "to" => label).increment(1);
}

pub fn set_open(circuit: &str, open: bool) {
    gauge!(OPEN, "circuit" => circuit.to_string()).set(if open { 1.0 } else { 0.0 });
}

pub fn record_store_error(circuit: &str, operation: &'static str) {
    counter!(STORE_ERRORS_TOTAL, "circuit" => circuit.to_string(), "operation" => operation)
        .increment(1);
}
