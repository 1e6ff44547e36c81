use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::circuit_breaker::CircuitBreaker;
use super::clock::{Clock, SystemClock};
use crate::config::{CircuitConfig, Settings, Validate};
use crate::error::Result;
use crate::metrics;
use crate::store::Backends;

/// Identity of a shared circuit: its name and its full configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    name: String,
    config: CircuitConfig,
}

/// Shares one [`CircuitBreaker`] per `(name, config)` pair
///
/// The registry is an ordinary value: build one at startup and hand it (or an
/// `Arc` of it) to the code that needs circuits. Entries live as long as the
/// registry.
///
/// ```rust
/// use circuit_breaker::config::CircuitConfig;
/// use circuit_breaker::resilience::Registry;
/// use circuit_breaker::store::Backends;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> circuit_breaker::Result<()> {
/// let registry = Registry::new(Backends::in_memory());
/// let config = CircuitConfig::default().with_fail_threshold(3);
///
/// let first = registry.get("inventory", &config).await?;
/// let second = registry.get("inventory", &config).await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// # Ok(())
/// # }
/// ```
pub struct Registry {
    backends: Backends,
    clock: Arc<dyn Clock>,
    settings: Settings,
    circuits: DashMap<Fingerprint, Arc<OnceCell<Arc<CircuitBreaker>>>>,
}

impl Registry {
    /// Registry with default settings and the system clock
    pub fn new(backends: Backends) -> Self {
        Self::with_clock(backends, Arc::new(SystemClock))
    }

    pub fn with_clock(backends: Backends, clock: Arc<dyn Clock>) -> Self {
        Self {
            backends,
            clock,
            settings: Settings::default(),
            circuits: DashMap::new(),
        }
    }

    /// Registry whose defaults and named groups come from `settings`
    pub fn with_settings(backends: Backends, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            ..Self::with_clock(backends, clock)
        }
    }

    /// Build the backends described by `settings` and a registry over them
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        metrics::describe();
        let backends = Backends::from_config(&settings.storage).await?;
        Ok(Self::with_settings(backends, settings, Arc::new(SystemClock)))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Shared circuit for `name` and `config`, created on first use
    ///
    /// Concurrent first calls for the same pair build the circuit once and
    /// all receive that instance. An invalid config or unknown backend fails
    /// without registering anything.
    pub async fn get(&self, name: &str, config: &CircuitConfig) -> Result<Arc<CircuitBreaker>> {
        config.validate()?;
        let store = self.backends.resolve(&config.storage_backend)?;

        let fingerprint = Fingerprint {
            name: name.to_string(),
            config: config.clone(),
        };

        // Clone the cell out so no map shard lock is held across the await
        let cell = self
            .circuits
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let circuit = cell
            .get_or_init(|| async {
                let circuit = CircuitBreaker::open(
                    name.to_string(),
                    config.clone(),
                    Arc::clone(&store),
                    Arc::clone(&self.clock),
                )
                .await;

                tracing::debug!(
                    circuit = %name,
                    fail_threshold = config.fail_threshold,
                    open_duration = config.open_duration,
                    storage_backend = %config.storage_backend,
                    "Circuit registered"
                );

                Arc::new(circuit)
            })
            .await;

        Ok(Arc::clone(circuit))
    }

    /// Shared circuit for `name` using the default config
    pub async fn get_default(&self, name: &str) -> Result<Arc<CircuitBreaker>> {
        let config = self.settings.defaults.clone();
        self.get(name, &config).await
    }

    /// Shared circuit for `name` using the named configuration group
    pub async fn get_group(&self, name: &str, group: &str) -> Result<Arc<CircuitBreaker>> {
        let config = self.settings.circuit_config(group)?;
        self.get(name, &config).await
    }

    /// Number of registered circuits
    pub fn len(&self) -> usize {
        self.circuits
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of registered circuits, sorted and deduplicated
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuits
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Every registered circuit
    pub fn circuits(&self) -> Vec<Arc<CircuitBreaker>> {
        self.circuits
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.backends.identifiers())
            .field("circuits", &self.names())
            .finish_non_exhaustive()
    }
}
