//! Tests for graceful shutdown coordination.

use ca_resilience::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_initial_state_is_running() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.state(), ShutdownState::Running);
    assert!(coordinator.is_accepting());
    assert!(!coordinator.token().is_cancelled());
}

#[test]
fn test_track_increments_count() {
    let coordinator = ShutdownCoordinator::new();
    assert_eq!(coordinator.in_flight_count(), 0);

    let g1 = coordinator.track();
    let g2 = coordinator.track();
    assert!(g1.is_some() && g2.is_some());
    assert_eq!(coordinator.in_flight_count(), 2);

    drop(g1);
    assert_eq!(coordinator.in_flight_count(), 1);
    drop(g2);
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_track_returns_none_after_initiate() {
    let coordinator = ShutdownCoordinator::new();
    let _ = coordinator.initiate(Duration::from_millis(10)).await;

    assert!(!coordinator.is_accepting());
    assert!(coordinator.token().is_cancelled());
    assert!(coordinator.track().is_none());
    // A refused track leaves no residue in the count.
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_drain_completes_when_zero_in_flight() {
    let coordinator = ShutdownCoordinator::new();
    let result = coordinator.initiate(Duration::from_millis(100)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_tick() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.track().unwrap();

    let coord_clone = coordinator.clone();
    let handle = tokio::spawn(async move { coord_clone.initiate(Duration::from_millis(500)).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(coordinator.state(), ShutdownState::Draining);
    drop(guard);

    let result = handle.await.unwrap();
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_returns_remaining() {
    let coordinator = ShutdownCoordinator::new();
    let _guard = coordinator.track().unwrap();

    let result = coordinator.initiate(Duration::from_millis(50)).await;
    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    assert_eq!(coordinator.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_token_wakes_waiters() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let token = coordinator.token();
    let waiter = tokio::spawn(async move { token.cancelled().await });

    coordinator.initiate(Duration::from_millis(10)).await;
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter released")
        .unwrap();
}
