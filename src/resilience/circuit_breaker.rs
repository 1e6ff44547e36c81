//! Circuit Breaker Pattern Implementation
//!
//! A circuit breaker records the outcome of calls to one named external
//! dependency and tells callers whether the next call should be attempted.
//! It never executes the call itself and never reports an open circuit as an
//! error: callers ask [`CircuitBreaker::ready`], run their call, then report
//! the outcome with [`CircuitBreaker::success`] or [`CircuitBreaker::failure`].
//!
//! Every transition is written through to a [`StateStore`], so the state is
//! shared with every process that uses the same backend.
//!
//! # Example
//!
//! ```rust
//! use circuit_breaker::config::CircuitConfig;
//! use circuit_breaker::resilience::Registry;
//! use circuit_breaker::store::Backends;
//!
//! # #[tokio::main]
//! # async fn main() -> circuit_breaker::Result<()> {
//! let registry = Registry::new(Backends::in_memory());
//! let circuit = registry
//!     .get("http://foo.bar/test", &CircuitConfig::default())
//!     .await?;
//!
//! if circuit.ready() {
//!     // Attempt the external call here
//!     let ok = true;
//!
//!     if ok {
//!         circuit.success().await;
//!     } else {
//!         circuit.failure().await;
//!     }
//! } else {
//!     // Circuit is open, serve a fallback
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, Mutex as AsyncMutex};

use super::clock::Clock;
use super::state::{CircuitState, FieldValue, Phase, StateField, StateOverrides, Timestamp};
use crate::config::{CircuitConfig, Validate, WriteMode};
use crate::error::Result;
use crate::metrics;
use crate::store::{Backends, StateStore};

/// Circuit breaker for one named resource
///
/// # Thread Safety
///
/// The in-memory state sits behind a per-instance mutex, so concurrent
/// reports never lose counter updates. Store writes are serialised per
/// circuit and always persist the newest state.
pub struct CircuitBreaker {
    /// Circuit name, also the store key
    name: String,
    config: CircuitConfig,
    /// In-memory state, authoritative for this process
    state: Mutex<CircuitState>,
    /// Serialises store writes
    write_gate: Arc<AsyncMutex<()>>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    /// Feeds the background writer in detached mode
    writer: Option<watch::Sender<CircuitState>>,
}

impl CircuitBreaker {
    /// Build a circuit and load its persisted state
    ///
    /// A circuit with no stored state, or whose state cannot be loaded, starts
    /// closed and persists that state.
    pub async fn new(
        name: impl Into<String>,
        config: CircuitConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::open(name.into(), config, store, clock).await)
    }

    /// Construction after `config` has been validated
    pub(crate) async fn open(
        name: String,
        config: CircuitConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {

        let loaded = match store.load(&name).await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(
                    circuit = %name,
                    error = %err,
                    "Failed to load circuit state, starting closed"
                );
                metrics::record_store_error(&name, "load");
                None
            }
        };

        let write_gate = Arc::new(AsyncMutex::new(()));
        let initial = loaded.unwrap_or_default();

        let writer = match config.write_mode {
            WriteMode::Blocking => None,
            WriteMode::Detached => {
                let (sender, receiver) = watch::channel(initial);
                spawn_writer(
                    name.clone(),
                    Arc::clone(&store),
                    Arc::clone(&write_gate),
                    receiver,
                );
                Some(sender)
            }
        };

        let breaker = Self {
            name,
            config,
            state: Mutex::new(initial),
            write_gate,
            store,
            clock,
            writer,
        };

        match loaded {
            Some(state) => {
                tracing::debug!(
                    circuit = %breaker.name,
                    connection_allowed = state.connection_allowed,
                    failed_total = state.failed_total,
                    "Circuit state loaded"
                );
                metrics::set_open(&breaker.name, state.is_open());
            }
            None => {
                breaker.transition(|_, _| CircuitState::closed()).await;
                tracing::debug!(circuit = %breaker.name, "Circuit state initialised");
                metrics::set_open(&breaker.name, false);
            }
        }

        breaker
    }

    /// Build a circuit using the store registered for `config.storage_backend`
    pub async fn with_backends(
        name: impl Into<String>,
        config: CircuitConfig,
        backends: &Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = backends.resolve(&config.storage_backend)?;
        Self::new(name, config, store, clock).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Whether the circuit is open, i.e. calls are blocked
    pub fn is_open(&self) -> bool {
        self.lock_state().is_open()
    }

    /// Whether a call may be attempted now
    ///
    /// True while closed, and again once an open circuit's cool-down has
    /// elapsed. In the latter case the caller should make a single probe
    /// call and report its outcome.
    pub fn ready(&self) -> bool {
        self.lock_state().ready_at(self.clock.now())
    }

    /// Derived Closed / Open / HalfOpen view of the circuit
    pub fn phase(&self) -> Phase {
        self.lock_state().phase_at(self.clock.now())
    }

    /// Snapshot of the full state
    pub fn status(&self) -> CircuitState {
        *self.lock_state()
    }

    /// Single field of the state
    pub fn status_field(&self, field: StateField) -> FieldValue {
        self.lock_state().get(field)
    }

    /// Report a successful call
    ///
    /// Closes the circuit from any phase. Only the lifetime failure count is
    /// kept.
    pub async fn success(&self) -> CircuitState {
        let (before, after) = self.transition(|state, _| state.succeeded()).await;

        metrics::record_success(&self.name);

        if before.is_open() {
            tracing::info!(
                circuit = %self.name,
                state = "Open -> Closed",
                failed_total = after.failed_total,
                "Circuit breaker closed after successful call"
            );
            metrics::record_transition(&self.name, Phase::Closed);
            metrics::set_open(&self.name, false);
        }

        after
    }

    /// Report a failed call
    ///
    /// While closed, counts towards the threshold and opens the circuit for
    /// `open_duration` seconds once reached. While open, only the lifetime
    /// count changes; the cool-down is not extended.
    pub async fn failure(&self) -> CircuitState {
        let fail_threshold = self.config.fail_threshold;
        let open_for = self.config.open_duration;

        let (before, after) = self
            .transition(|state, now| state.failed(fail_threshold, open_for, now))
            .await;

        metrics::record_failure(&self.name);

        if !before.is_open() && after.is_open() {
            tracing::warn!(
                circuit = %self.name,
                state = "Closed -> Open",
                failed_total = after.failed_total,
                fail_threshold,
                retry_after = after.retry_after,
                "Circuit breaker opened due to consecutive failures"
            );
            metrics::record_transition(&self.name, Phase::Open);
            metrics::set_open(&self.name, true);
        } else {
            tracing::debug!(
                circuit = %self.name,
                failed_since_open = after.failed_since_open,
                failed_total = after.failed_total,
                open = after.is_open(),
                "Circuit failure recorded"
            );
        }

        after
    }

    /// Force the circuit into the closed, zeroed state merged with `overrides`
    ///
    /// ```rust
    /// # use circuit_breaker::resilience::{Registry, StateOverrides};
    /// # use circuit_breaker::store::Backends;
    /// # #[tokio::main]
    /// # async fn main() -> circuit_breaker::Result<()> {
    /// # let registry = Registry::new(Backends::in_memory());
    /// # let circuit = registry.get_default("payments").await?;
    /// // Hard reset
    /// circuit.reset(StateOverrides::default()).await;
    ///
    /// // Hold the circuit open for maintenance
    /// circuit
    ///     .reset(StateOverrides::default().connection_allowed(false))
    ///     .await;
    /// assert!(circuit.is_open());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn reset(&self, overrides: StateOverrides) -> CircuitState {
        let open_for = self.config.open_duration;
        let (_, after) = self
            .transition(|_, now| overrides.apply(open_for, now))
            .await;

        tracing::info!(
            circuit = %self.name,
            connection_allowed = after.connection_allowed,
            retry_after = after.retry_after,
            "Circuit breaker manually reset"
        );
        metrics::record_transition(
            &self.name,
            if after.is_open() { Phase::Open } else { Phase::Closed },
        );
        metrics::set_open(&self.name, after.is_open());

        after
    }

    /// Write the current state to the store and wait for it
    ///
    /// Only needed in detached mode, e.g. before shutdown.
    pub async fn flush(&self) {
        let _gate = self.write_gate.lock().await;
        let state = self.status();
        persist(&self.name, self.store.as_ref(), &state).await;
    }

    /// Replace the state under the lock and hand the result to the store.
    ///
    /// Returns the state before and after the transition.
    async fn transition<F>(&self, apply: F) -> (CircuitState, CircuitState)
    where
        F: FnOnce(CircuitState, Timestamp) -> CircuitState,
    {
        match &self.writer {
            Some(writer) => {
                let mut state = self.lock_state();
                let before = *state;
                *state = apply(before, self.clock.now());
                writer.send_replace(*state);
                (before, *state)
            }
            None => {
                let _gate = self.write_gate.lock().await;
                let (before, after) = {
                    let mut state = self.lock_state();
                    let before = *state;
                    *state = apply(before, self.clock.now());
                    (before, *state)
                };
                persist(&self.name, self.store.as_ref(), &after).await;
                (before, after)
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CircuitState> {
        // The state is a Copy value replaced in one assignment, so a
        // poisoned lock still guards a consistent value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.status())
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Save `state`, logging instead of failing
async fn persist(name: &str, store: &dyn StateStore, state: &CircuitState) {
    if let Err(err) = store.save(name, state).await {
        tracing::warn!(
            circuit = %name,
            error = %err,
            "Failed to persist circuit state, keeping in-memory state"
        );
        metrics::record_store_error(name, "save");
    }
}

/// Persist the newest published state until the breaker is dropped
fn spawn_writer(
    name: String,
    store: Arc<dyn StateStore>,
    write_gate: Arc<AsyncMutex<()>>,
    mut receiver: watch::Receiver<CircuitState>,
) {
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let _gate = write_gate.lock().await;
            let state = *receiver.borrow_and_update();
            persist(&name, store.as_ref(), &state).await;
        }
        tracing::debug!(circuit = %name, "Circuit state writer stopped");
    });
}
