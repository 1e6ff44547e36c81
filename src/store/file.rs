use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{StateStore, StoreError, StoreKey, DEFAULT_ENTRY_LIFETIME};
use crate::resilience::CircuitState;

/// On-disk record: the state plus its absolute expiry in unix seconds
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    state: CircuitState,
    expires_at: u64,
}

/// Filesystem-backed store, one file per circuit
///
/// Survives restarts and is visible to every process on the machine that
/// points at the same directory. Writes go to a temporary file that is then
/// renamed over the previous record, so readers never observe a torn write.
#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    key: StoreKey,
    lifetime: Duration,
    sequence: AtomicU64,
}

impl FileStore {
    /// Open a store in `directory`, creating it if needed
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_options(
            directory,
            StoreKey::default(),
            Duration::from_secs(DEFAULT_ENTRY_LIFETIME),
        )
        .await
    }

    pub async fn with_options(
        directory: impl Into<PathBuf>,
        key: StoreKey,
        lifetime: Duration,
    ) -> Result<Self, StoreError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;

        Ok(Self {
            directory,
            key,
            lifetime,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Circuit names are arbitrary strings (often long URLs), so the file is
    /// named by a fixed-length digest of the full key.
    fn path_for(&self, circuit: &str) -> PathBuf {
        let digest = Sha256::digest(self.key.build(circuit).as_bytes());
        self.directory.join(format!("{}.state", hex::encode(digest)))
    }

    fn temp_path_for(&self, target: &Path) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut name = target.as_os_str().to_owned();
        name.push(format!(".{}.{}.tmp", std::process::id(), sequence));
        PathBuf::from(name)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl StateStore for FileStore {
    #[tracing::instrument(skip(self, state), fields(store = "file"))]
    async fn save(&self, circuit: &str, state: &CircuitState) -> Result<(), StoreError> {
        let record = Record {
            state: *state,
            expires_at: unix_now().saturating_add(self.lifetime.as_secs()),
        };
        let data = bincode::serialize(&record)?;

        let target = self.path_for(circuit);
        let temp = self.temp_path_for(&target);

        if let Err(err) = tokio::fs::write(&temp, &data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err.into());
        }

        ::tracing::debug!("Circuit state written");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(store = "file"))]
    async fn load(&self, circuit: &str) -> Result<Option<CircuitState>, StoreError> {
        let path = self.path_for(circuit);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: Record = bincode::deserialize(&data)?;

        // Left on disk: another process may have just renamed a fresh record over it
        if unix_now() >= record.expires_at {
            ::tracing::debug!("Stored circuit state expired");
            return Ok(None);
        }

        Ok(Some(record.state))
    }
}
