use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{FileStore, MemoryStore, StateStore, StoreKey};
use crate::config::circuit::MEMORY_BACKEND;
use crate::config::{ConfigError, StorageConfig};
use crate::error::Result;

/// Backend identifier of the filesystem store
pub const FILE_BACKEND: &str = "file";

/// Legacy identifier for the filesystem store
pub const NATIVE_BACKEND: &str = "native";

/// Backend identifier of the redis store
pub const REDIS_BACKEND: &str = "redis";

/// Registration table from backend identifier to store instance
///
/// Built once at startup. Circuits resolve their `storage_backend` through it
/// and every circuit using the same identifier shares one store.
#[derive(Debug, Clone, Default)]
pub struct Backends {
    stores: HashMap<String, Arc<dyn StateStore>>,
}

impl Backends {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with only the process-local memory store
    pub fn in_memory() -> Self {
        let mut backends = Self::new();
        backends.register(MEMORY_BACKEND, Arc::new(MemoryStore::new()));
        backends
    }

    /// Build every backend the storage configuration enables
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let key = StoreKey::new(config.prefix.clone());
        let lifetime = Duration::from_secs(config.entry_lifetime);

        let mut backends = Self::new();
        backends.register(
            MEMORY_BACKEND,
            Arc::new(MemoryStore::with_options(
                key.clone(),
                lifetime,
                num_cpus::get() * 4,
            )),
        );

        if let Some(file) = &config.file {
            let store: Arc<dyn StateStore> =
                Arc::new(FileStore::with_options(&file.directory, key.clone(), lifetime).await?);
            backends.register(FILE_BACKEND, Arc::clone(&store));
            backends.register(NATIVE_BACKEND, store);
            tracing::info!(directory = %file.directory.display(), "File state store registered");
        }

        if let Some(redis) = &config.redis {
            backends.register_redis(redis, key, lifetime).await?;
        }

        Ok(backends)
    }

    #[cfg(feature = "redis-cache")]
    async fn register_redis(
        &mut self,
        config: &crate::config::RedisStoreConfig,
        key: StoreKey,
        lifetime: Duration,
    ) -> Result<()> {
        let store = super::RedisStore::with_options(
            &config.url,
            key,
            lifetime,
            Duration::from_millis(config.connection_timeout),
        )
        .await?;

        self.register(REDIS_BACKEND, Arc::new(store));
        tracing::info!(url = %config.url, "Redis state store registered");
        Ok(())
    }

    #[cfg(not(feature = "redis-cache"))]
    async fn register_redis(
        &mut self,
        _config: &crate::config::RedisStoreConfig,
        _key: StoreKey,
        _lifetime: Duration,
    ) -> Result<()> {
        tracing::warn!("storage.redis is configured but the redis-cache feature is disabled");
        Ok(())
    }

    /// Register `store` under `id`, replacing any previous registration
    pub fn register(&mut self, id: impl Into<String>, store: Arc<dyn StateStore>) -> &mut Self {
        self.stores.insert(id.into(), store);
        self
    }

    /// Store registered under `id`
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn StateStore>> {
        self.stores
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBackend(id.to_string()).into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stores.contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stores.keys().cloned().collect();
        ids.sort();
        ids
    }
}
