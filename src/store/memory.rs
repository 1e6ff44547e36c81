use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{StateStore, StoreError, StoreKey, DEFAULT_ENTRY_LIFETIME};
use crate::resilience::CircuitState;

/// Stored state with expiration
#[derive(Debug, Clone, Copy)]
struct Entry {
    state: CircuitState,
    /// None when the lifetime is too large to represent: the entry never expires
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(state: CircuitState, lifetime: Duration) -> Self {
        Self {
            state,
            expires_at: Instant::now().checked_add(lifetime),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// Process-local store using DashMap
///
/// Fastest backend. State is not shared with other processes and is lost on
/// restart.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    key: StoreKey,
    lifetime: Duration,
}

impl MemoryStore {
    /// Create a new MemoryStore with default shard count (CPU count * 4)
    pub fn new() -> Self {
        Self::with_options(
            StoreKey::default(),
            Duration::from_secs(DEFAULT_ENTRY_LIFETIME),
            num_cpus::get() * 4,
        )
    }

    pub fn with_options(key: StoreKey, lifetime: Duration, shard_count: usize) -> Self {
        // DashMap requires a power of two greater than one
        let shard_count = shard_count.max(2).next_power_of_two();

        Self {
            entries: DashMap::with_shard_amount(shard_count),
            key,
            lifetime,
        }
    }

    /// Number of stored entries, including ones that expired but were not read since
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save(&self, circuit: &str, state: &CircuitState) -> Result<(), StoreError> {
        self.entries
            .insert(self.key.build(circuit), Entry::new(*state, self.lifetime));
        Ok(())
    }

    async fn load(&self, circuit: &str) -> Result<Option<CircuitState>, StoreError> {
        let key = self.key.build(circuit);

        let Some(entry) = self.entries.get(&key).map(|entry| *entry) else {
            return Ok(None);
        };

        if entry.is_expired() {
            // Re-checked under the shard lock so a concurrent save is never dropped
            self.entries.remove_if(&key, |_, entry| entry.is_expired());
            return Ok(None);
        }

        Ok(Some(entry.state))
    }
}
