//! Shared fixtures for the pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use order_events::consumer::{ConsumerConfig, Notifier, NotifyError};
use order_events::relay::RelayConfig;
use order_events::supervisor::{ConnectionSupervisor, SupervisorConfig};
use order_events::{Backoff, CreateOrder, InMemoryBroker, Order};
use tokio::time::Instant;

/// Deterministic, fast retry schedule: 10ms, 20ms, 40ms, ... capped at 200ms.
pub fn fast_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(10), 2.0, Duration::from_millis(200), 0.0).unwrap()
}

pub fn relay_config(id: &str) -> RelayConfig {
    RelayConfig::default()
        .with_relay_id(id)
        .with_poll_interval(Duration::from_millis(5))
        .with_backoff(fast_backoff())
}

pub fn consumer_config(id: &str) -> ConsumerConfig {
    ConsumerConfig::default()
        .with_consumer_id(id)
        .with_poll_timeout(Duration::from_millis(20))
        .with_max_deliveries(3)
        .with_retry_backoff(fast_backoff())
}

pub fn broker_supervisor(broker: &InMemoryBroker) -> Arc<ConnectionSupervisor<InMemoryBroker>> {
    Arc::new(ConnectionSupervisor::new(
        broker.clone(),
        SupervisorConfig::new("broker").with_backoff(fast_backoff()),
    ))
}

pub fn order_request(user: &str) -> CreateOrder {
    CreateOrder::new(user, "p1", 2)
}

/// Wait until `condition` holds, failing the test after five seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records every notified event id, optionally taking `latency` per call.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub notified: Arc<Mutex<Vec<String>>>,
    latency: Duration,
}

impl RecordingNotifier {
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.notified.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _order: &Order, event_id: &str) -> Result<(), NotifyError> {
        self.notified.lock().unwrap().push(event_id.to_string());
        tokio::time::sleep(self.latency).await;
        Ok(())
    }
}

/// Always fails, counting attempts.
#[derive(Clone, Default)]
pub struct FailingNotifier {
    pub calls: Arc<AtomicUsize>,
}

impl FailingNotifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _order: &Order, _event_id: &str) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError("mail server down".into()))
    }
}
