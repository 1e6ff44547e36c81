//! End-to-end circuit behaviour driven through the registry with a manual clock

use circuit_breaker::config::CircuitConfig;
use circuit_breaker::resilience::{
    FieldValue, ManualClock, Phase, Registry, StateField, StateOverrides, Timestamp,
};
use circuit_breaker::store::{Backends, MemoryStore, StateStore};
use std::sync::Arc;

const T0: Timestamp = 1_700_000_000;

struct Harness {
    registry: Registry,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(MemoryStore::new());

    let mut backends = Backends::new();
    backends.register("memory", store.clone());

    Harness {
        registry: Registry::with_clock(backends, clock.clone()),
        clock,
        store,
    }
}

fn config(fail_threshold: u32) -> CircuitConfig {
    CircuitConfig::default().with_fail_threshold(fail_threshold)
}

// =============================================================================
// Threshold
// =============================================================================

#[tokio::test]
async fn test_threshold_minus_one_failures_stay_closed() {
    for threshold in 1..=8u32 {
        let h = harness();
        let circuit = h
            .registry
            .get(&format!("svc-{}", threshold), &config(threshold))
            .await
            .unwrap();

        for _ in 1..threshold {
            circuit.failure().await;
        }
        assert!(!circuit.is_open(), "threshold {} opened early", threshold);

        circuit.failure().await;
        assert!(circuit.is_open(), "threshold {} did not open", threshold);
    }
}

#[tokio::test]
async fn test_three_failures_open_with_retry_after() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(3)).await.unwrap();

    circuit.failure().await;
    circuit.failure().await;
    circuit.failure().await;

    assert!(circuit.is_open());
    assert_eq!(circuit.status().retry_after, T0 + 300);
    assert_eq!(h.store.load("svc").await.unwrap(), Some(circuit.status()));
}

// =============================================================================
// Cool-down
// =============================================================================

#[tokio::test]
async fn test_ready_only_after_retry_after() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(3)).await.unwrap();
    for _ in 0..3 {
        circuit.failure().await;
    }
    let retry_after = circuit.status().retry_after;

    assert!(!circuit.ready());

    h.clock.set(retry_after - 1);
    assert!(!circuit.ready());
    assert_eq!(circuit.phase(), Phase::Open);

    h.clock.set(retry_after + 1);
    assert!(circuit.ready());
    assert_eq!(circuit.phase(), Phase::HalfOpen);
}

#[tokio::test]
async fn test_failed_probe_keeps_window() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(3)).await.unwrap();
    for _ in 0..3 {
        circuit.failure().await;
    }
    let retry_after = circuit.status().retry_after;
    h.clock.set(retry_after + 1);

    circuit.failure().await;

    assert!(circuit.is_open());
    assert_eq!(circuit.status().retry_after, retry_after);
    assert_eq!(circuit.status_field(StateField::FailedTotal), FieldValue::Count(4));
    assert!(circuit.ready());
}

#[tokio::test]
async fn test_blocked_failures_do_not_change_readiness() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(1)).await.unwrap();
    circuit.failure().await;
    let retry_after = circuit.status().retry_after;

    for _ in 0..20 {
        circuit.failure().await;
        assert!(!circuit.ready());
    }

    assert_eq!(circuit.status().retry_after, retry_after);
    assert_eq!(circuit.status().failed_total, 21);
}

// =============================================================================
// Success
// =============================================================================

#[tokio::test]
async fn test_successful_probe_closes_circuit() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(3)).await.unwrap();
    for _ in 0..3 {
        circuit.failure().await;
    }
    h.clock.set(circuit.status().retry_after + 1);

    circuit.success().await;

    assert!(!circuit.is_open());
    assert_eq!(circuit.status_field(StateField::FailedSinceOpen), FieldValue::Count(0));
    assert_eq!(circuit.status_field(StateField::RetryAfter), FieldValue::Timestamp(0));
    assert_eq!(circuit.status().failed_total, 3);
}

#[tokio::test]
async fn test_success_from_every_phase() {
    let h = harness();

    // Closed with some failures
    let closed = h.registry.get("closed", &config(5)).await.unwrap();
    closed.failure().await;
    closed.failure().await;
    let after = closed.success().await;
    assert!(after.connection_allowed);
    assert_eq!((after.failed_since_open, after.failed_total, after.retry_after), (0, 2, 0));

    // Open, before the cool-down elapsed
    let open = h.registry.get("open", &config(1)).await.unwrap();
    open.failure().await;
    let after = open.success().await;
    assert!(after.connection_allowed);
    assert_eq!((after.failed_since_open, after.failed_total, after.retry_after), (0, 1, 0));

    // Open, probe-ready
    let probing = h.registry.get("probing", &config(1)).await.unwrap();
    probing.failure().await;
    h.clock.advance(301);
    assert_eq!(probing.phase(), Phase::HalfOpen);
    let after = probing.success().await;
    assert!(after.connection_allowed);
    assert_eq!((after.failed_since_open, after.failed_total, after.retry_after), (0, 1, 0));
}

// =============================================================================
// Lifetime counter
// =============================================================================

#[tokio::test]
async fn test_failed_total_counts_failures_since_reset() {
    let h = harness();
    let circuit = h.registry.get("svc", &config(2)).await.unwrap();

    for _ in 0..3 {
        circuit.failure().await;
    }
    circuit.success().await;
    circuit.failure().await;
    assert_eq!(circuit.status().failed_total, 4);

    circuit.reset(StateOverrides::default()).await;
    assert_eq!(circuit.status().failed_total, 0);

    circuit.failure().await;
    circuit.success().await;
    circuit.failure().await;
    assert_eq!(circuit.status().failed_total, 2);
}

// =============================================================================
// Fresh circuits and resets
// =============================================================================

#[tokio::test]
async fn test_fresh_circuit_defaults() {
    let h = harness();
    let circuit = h.registry.get_default("fresh").await.unwrap();

    assert_eq!(
        circuit.status_field(StateField::ConnectionAllowed),
        FieldValue::Flag(true)
    );
    assert_eq!(circuit.status_field(StateField::FailedTotal), FieldValue::Count(0));
    assert!(h.store.load("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reset_forced_open_until_custom_time() {
    let h = harness();
    let circuit = h.registry.get_default("svc").await.unwrap();

    circuit
        .reset(
            StateOverrides::default()
                .connection_allowed(false)
                .retry_after(T0 + 600),
        )
        .await;

    assert!(circuit.is_open());
    assert!(!circuit.ready());

    h.clock.set(T0 + 599);
    assert!(!circuit.ready());

    h.clock.set(T0 + 601);
    assert!(circuit.ready());
    assert_eq!(h.store.load("svc").await.unwrap(), Some(circuit.status()));
}
