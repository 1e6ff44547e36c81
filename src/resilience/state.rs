//! Persisted circuit state and its transition rules.
//!
//! A [`CircuitState`] is a plain value. Every transition consumes the current
//! value and returns the next one, so the breaker can swap it wholesale under
//! its lock and hand an identical copy to the store.
//!
//! ```text
//!            failed_since_open >= fail_threshold
//! ┌────────┐ ─────────────────────────────────► ┌────────┐
//! │ Closed │                                    │  Open  │ ◄─┐ failure()
//! └────────┘ ◄───────────────────────────────── └───┬────┘ ──┘ (retry_after kept)
//!      ▲               success()                    │ now > retry_after
//!      │                                            ▼
//!      │           success()                  ┌──────────┐
//!      └───────────────────────────────────── │ HalfOpen │ (derived, never stored)
//!                                             └──────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix timestamp in whole seconds. `0` means "unset".
pub type Timestamp = u64;

/// Logical phase of a circuit, derived from a [`CircuitState`] and the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Normal operation, calls pass through
    Closed,
    /// Calls are blocked until the cool-down elapses
    Open,
    /// Cool-down elapsed, a single probe call may be attempted
    HalfOpen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Closed => write!(f, "Closed"),
            Phase::Open => write!(f, "Open"),
            Phase::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// The persisted state of one named circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    /// `true` while the circuit is closed and calls pass through
    pub connection_allowed: bool,
    /// Consecutive failures counted while closed
    pub failed_since_open: u64,
    /// Lifetime failure counter, only cleared by an explicit reset
    pub failed_total: u64,
    /// Earliest time a probe may be attempted, `0` while closed
    pub retry_after: Timestamp,
}

impl CircuitState {
    /// The closed, zeroed state a circuit starts in
    pub const fn closed() -> Self {
        Self {
            connection_allowed: true,
            failed_since_open: 0,
            failed_total: 0,
            retry_after: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.connection_allowed
    }

    /// Whether a call may be attempted at `now`
    pub fn ready_at(&self, now: Timestamp) -> bool {
        now > self.retry_after
    }

    pub fn phase_at(&self, now: Timestamp) -> Phase {
        if self.connection_allowed {
            Phase::Closed
        } else if self.ready_at(now) {
            Phase::HalfOpen
        } else {
            Phase::Open
        }
    }

    /// State after a call reported as successful. Only `failed_total` survives.
    #[must_use]
    pub fn succeeded(self) -> Self {
        Self {
            failed_total: self.failed_total,
            ..Self::closed()
        }
    }

    /// State after a call reported as failed.
    ///
    /// An open circuit only counts the failure in `failed_total`; its
    /// `retry_after` is left untouched so repeated probe failures cannot
    /// postpone the next probe window.
    #[must_use]
    pub fn failed(self, fail_threshold: u32, open_for: u64, now: Timestamp) -> Self {
        let failed_total = self.failed_total.saturating_add(1);

        if self.is_open() {
            return Self { failed_total, ..self };
        }

        let failed_since_open = self.failed_since_open.saturating_add(1);

        if failed_since_open >= u64::from(fail_threshold) {
            Self {
                connection_allowed: false,
                failed_since_open: 0,
                failed_total,
                retry_after: now.saturating_add(open_for).max(1),
            }
        } else {
            Self {
                failed_since_open,
                failed_total,
                ..self
            }
        }
    }

    /// Read a single field by name
    pub fn get(&self, field: StateField) -> FieldValue {
        match field {
            StateField::ConnectionAllowed => FieldValue::Flag(self.connection_allowed),
            StateField::FailedSinceOpen => FieldValue::Count(self.failed_since_open),
            StateField::FailedTotal => FieldValue::Count(self.failed_total),
            StateField::RetryAfter => FieldValue::Timestamp(self.retry_after),
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::closed()
    }
}

/// Addressable fields of a [`CircuitState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    ConnectionAllowed,
    FailedSinceOpen,
    FailedTotal,
    RetryAfter,
}

impl StateField {
    pub const ALL: [StateField; 4] = [
        StateField::ConnectionAllowed,
        StateField::FailedSinceOpen,
        StateField::FailedTotal,
        StateField::RetryAfter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateField::ConnectionAllowed => "connection_allowed",
            StateField::FailedSinceOpen => "failed_since_open",
            StateField::FailedTotal => "failed_total",
            StateField::RetryAfter => "retry_after",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a field name does not match any [`StateField`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown circuit state field `{0}`")]
pub struct UnknownField(pub String);

impl FromStr for StateField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// Value of a single [`StateField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Count(u64),
    Timestamp(Timestamp),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(value) => write!(f, "{}", value),
            FieldValue::Count(value) | FieldValue::Timestamp(value) => write!(f, "{}", value),
        }
    }
}

/// Caller-supplied values merged over the closed default by a reset
///
/// ```rust
/// use circuit_breaker::resilience::StateOverrides;
///
/// // Force the circuit open until a fixed point in time
/// let overrides = StateOverrides::default()
///     .connection_allowed(false)
///     .retry_after(1_700_000_600);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateOverrides {
    #[serde(default)]
    pub connection_allowed: Option<bool>,
    #[serde(default)]
    pub failed_since_open: Option<u64>,
    #[serde(default)]
    pub failed_total: Option<u64>,
    #[serde(default)]
    pub retry_after: Option<Timestamp>,
}

impl StateOverrides {
    pub fn connection_allowed(mut self, allowed: bool) -> Self {
        self.connection_allowed = Some(allowed);
        self
    }

    pub fn failed_since_open(mut self, count: u64) -> Self {
        self.failed_since_open = Some(count);
        self
    }

    pub fn failed_total(mut self, count: u64) -> Self {
        self.failed_total = Some(count);
        self
    }

    pub fn retry_after(mut self, at: Timestamp) -> Self {
        self.retry_after = Some(at);
        self
    }

    /// Merge onto the closed default.
    ///
    /// `connection_allowed` decides the phase. A closed result always carries
    /// `retry_after = 0`; an open result without a usable `retry_after` opens
    /// for `open_for` seconds from `now`.
    pub fn apply(self, open_for: u64, now: Timestamp) -> CircuitState {
        let base = CircuitState::closed();
        let connection_allowed = self.connection_allowed.unwrap_or(base.connection_allowed);

        let retry_after = if connection_allowed {
            0
        } else {
            match self.retry_after {
                Some(at) if at > 0 => at,
                _ => now.saturating_add(open_for).max(1),
            }
        };

        CircuitState {
            connection_allowed,
            failed_since_open: self.failed_since_open.unwrap_or(base.failed_since_open),
            failed_total: self.failed_total.unwrap_or(base.failed_total),
            retry_after,
        }
    }
}
