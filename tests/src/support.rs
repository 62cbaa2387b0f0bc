//! Shared fixtures for the integration suite.

use std::time::Duration;
use topic_bus::EventReceiver;
use tracing_subscriber::EnvFilter;

/// Upper bound for any single wait in the suite.
pub const WAIT: Duration = Duration::from_secs(2);

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Receive the next event, failing the test if nothing arrives in time.
pub async fn recv_within<T>(receiver: &mut EventReceiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, receiver.recv())
        .await
        .expect("timed out waiting for event")
}

/// Read exactly `count` events.
pub async fn recv_n<T>(receiver: &mut EventReceiver<T>, count: usize) -> Vec<T> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        match recv_within(receiver).await {
            Some(event) => events.push(event),
            None => break,
        }
    }
    events
}

/// Poll `condition` until it holds, failing the test after [`WAIT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Read up to `max` events, stopping at close or after a short quiet period.
pub async fn drain_quiet<T>(receiver: &mut EventReceiver<T>, max: usize) -> Vec<T> {
    let mut events = Vec::new();
    while events.len() < max {
        match tokio::time::timeout(Duration::from_millis(200), receiver.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) | Err(_) => break,
        }
    }
    events
}
