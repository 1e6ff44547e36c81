use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::time::timeout;

use super::{StateStore, StoreError, StoreKey, DEFAULT_ENTRY_LIFETIME};
use crate::resilience::CircuitState;

/// Redis-backed store shared across processes and machines
///
/// - Async operations using redis::aio::ConnectionManager
/// - Automatic reconnection
/// - Key prefixing for namespace isolation
/// - Bincode payloads written with SET EX
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    key: StoreKey,
    lifetime: Duration,
}

impl RedisStore {
    /// Connect with a default timeout of 3 seconds
    ///
    /// # Example
    /// ```no_run
    /// use circuit_breaker::store::RedisStore;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), circuit_breaker::store::StoreError> {
    ///     let store = RedisStore::new("redis://localhost:6379").await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        Self::with_options(
            url,
            StoreKey::default(),
            Duration::from_secs(DEFAULT_ENTRY_LIFETIME),
            Duration::from_secs(3),
        )
        .await
    }

    pub async fn with_options(
        url: &str,
        key: StoreKey,
        lifetime: Duration,
        connection_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::open(url)?;

        let conn_manager = timeout(connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "redis connection timeout after {:?}, check redis is running at {}",
                    connection_timeout, url
                ))
            })??;

        Ok(Self {
            conn_manager,
            key,
            lifetime,
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

/// Longer lifetimes are stored without an expiry
const MAX_EXPIRE_SECONDS: u64 = u32::MAX as u64;

#[async_trait]
impl StateStore for RedisStore {
    #[tracing::instrument(skip(self, state), fields(store = "redis"))]
    async fn save(&self, circuit: &str, state: &CircuitState) -> Result<(), StoreError> {
        let data = bincode::serialize(state)?;
        let mut conn = self.connection();

        let key = self.key.build(circuit);
        let seconds = self.lifetime.as_secs();

        // SET EX rejects a zero expiry and overflows on very large ones
        if seconds > MAX_EXPIRE_SECONDS {
            let _: () = conn.set(key, data).await?;
        } else {
            let _: () = conn.set_ex(key, data, seconds.max(1)).await?;
        }

        ::tracing::debug!("Circuit state written");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(store = "redis"))]
    async fn load(&self, circuit: &str) -> Result<Option<CircuitState>, StoreError> {
        let mut conn = self.connection();

        let data: Option<Vec<u8>> = conn.get(self.key.build(circuit)).await?;

        match data {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}
