//! Registry sharing and state visibility across processes

use circuit_breaker::config::{CircuitConfig, CircuitOverrides, FileStoreConfig, Settings, WriteMode};
use circuit_breaker::resilience::{ManualClock, Registry, StateOverrides};
use circuit_breaker::store::{Backends, FileStore, StateStore};
use std::sync::Arc;
use tempfile::TempDir;

const T0: u64 = 1_700_000_000;

async fn file_registry(dir: &TempDir, clock: Arc<ManualClock>) -> Registry {
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let mut backends = Backends::in_memory();
    backends.register("file", store);
    Registry::with_clock(backends, clock)
}

fn file_config() -> CircuitConfig {
    CircuitConfig::default()
        .with_fail_threshold(2)
        .with_storage_backend("file")
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_same_name_and_config_share_instance() {
    let registry = Registry::new(Backends::in_memory());
    let config = CircuitConfig::default().with_fail_threshold(3);

    let first = registry.get("inventory", &config).await.unwrap();
    let second = registry.get("inventory", &config.clone()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);

    first.failure().await;
    assert_eq!(second.status().failed_total, 1);
}

#[tokio::test]
async fn test_different_config_gets_new_instance() {
    let registry = Registry::new(Backends::in_memory());
    let base = CircuitConfig::default();

    let a = registry.get("inventory", &base).await.unwrap();
    let b = registry
        .get("inventory", &base.clone().with_open_duration(10))
        .await
        .unwrap();
    let c = registry.get("search", &base).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.names(), vec!["inventory", "search"]);
}

#[tokio::test]
async fn test_concurrent_first_use_creates_one_instance() {
    let registry = Arc::new(Registry::new(Backends::in_memory()));
    let config = CircuitConfig::default();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            registry.get("shared", &config).await.unwrap()
        }));
    }

    let mut circuits = Vec::new();
    for handle in handles {
        circuits.push(handle.await.unwrap());
    }

    for circuit in &circuits[1..] {
        assert!(Arc::ptr_eq(&circuits[0], circuit));
    }
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_invalid_requests_register_nothing() {
    let registry = Registry::new(Backends::in_memory());

    let unknown = CircuitConfig::default().with_storage_backend("memcache");
    let err = registry.get("svc", &unknown).await.unwrap_err();
    assert!(err.is_configuration());

    let invalid = CircuitConfig::default().with_fail_threshold(0);
    let err = registry.get("svc", &invalid).await.unwrap_err();
    assert!(err.is_configuration());

    let err = registry.get_group("svc", "missing").await.unwrap_err();
    assert!(err.is_configuration());

    assert!(registry.is_empty());
}

// =============================================================================
// Configuration groups
// =============================================================================

#[tokio::test]
async fn test_group_config_merges_over_defaults() {
    let mut settings = Settings::default();
    settings.defaults.fail_threshold = 4;
    settings.circuits.insert(
        "payments".to_string(),
        CircuitOverrides {
            open_duration: Some(60),
            ..CircuitOverrides::default()
        },
    );

    let clock = Arc::new(ManualClock::new(T0));
    let registry = Registry::with_settings(Backends::in_memory(), settings, clock);

    let circuit = registry.get_group("gateway", "payments").await.unwrap();
    assert_eq!(circuit.config().fail_threshold, 4);
    assert_eq!(circuit.config().open_duration, 60);

    for _ in 0..4 {
        circuit.failure().await;
    }
    assert_eq!(circuit.status().retry_after, T0 + 60);

    let default = registry.get_default("gateway").await.unwrap();
    assert!(!Arc::ptr_eq(&circuit, &default));
    assert!(!default.is_open());
}

#[tokio::test]
async fn test_from_settings_registers_file_backend() {
    let dir = TempDir::new().unwrap();

    let mut settings = Settings::default();
    settings.storage.file = Some(FileStoreConfig {
        directory: dir.path().join("circuits"),
    });
    settings.defaults = file_config();

    let registry = Registry::from_settings(settings).await.unwrap();
    assert_eq!(registry.backends().identifiers(), vec!["file", "memory", "native"]);

    let circuit = registry.get_default("svc").await.unwrap();
    circuit.failure().await;
    circuit.failure().await;
    assert!(circuit.is_open());

    assert!(dir.path().join("circuits").is_dir());
}

// =============================================================================
// Shared durable state
// =============================================================================

#[tokio::test]
async fn test_file_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    {
        let registry = file_registry(&dir, clock.clone()).await;
        let circuit = registry.get("billing", &file_config()).await.unwrap();
        circuit.failure().await;
        circuit.failure().await;
        assert!(circuit.is_open());
    }

    let registry = file_registry(&dir, clock.clone()).await;
    let circuit = registry.get("billing", &file_config()).await.unwrap();

    assert!(circuit.is_open());
    assert_eq!(circuit.status().failed_total, 2);
    assert_eq!(circuit.status().retry_after, T0 + 300);
}

#[tokio::test]
async fn test_registries_see_each_others_writes() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let first = file_registry(&dir, clock.clone()).await;
    let a = first.get("billing", &file_config()).await.unwrap();
    a.reset(StateOverrides::default().connection_allowed(false))
        .await;

    // A second process opening the circuit picks up the persisted state
    let second = file_registry(&dir, clock.clone()).await;
    let b = second.get("billing", &file_config()).await.unwrap();
    assert!(b.is_open());
    assert_eq!(b.status().retry_after, T0 + 300);

    b.success().await;

    let store = FileStore::open(dir.path()).await.unwrap();
    let persisted = store.load("billing").await.unwrap().unwrap();
    assert!(persisted.connection_allowed);
}

#[tokio::test]
async fn test_detached_writes_reach_store_after_flush() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let registry = file_registry(&dir, clock).await;

    let config = file_config().with_write_mode(WriteMode::Detached);
    let circuit = registry.get("reports", &config).await.unwrap();

    circuit.failure().await;
    circuit.failure().await;
    assert!(circuit.is_open());

    circuit.flush().await;

    let store = FileStore::open(dir.path()).await.unwrap();
    assert_eq!(store.load("reports").await.unwrap(), Some(circuit.status()));
}
