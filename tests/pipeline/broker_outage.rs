//! Broker outages: retries back off, attempts only grow, and the supervisor
//! degrades and recovers.

use std::time::Duration;

use order_events::relay::PublisherRelay;
use order_events::store::InMemoryStore;
use order_events::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorConfig};
use order_events::{InMemoryBroker, OutboxWriter, SupervisorError};

use crate::support::{fast_backoff, order_request, relay_config};

#[tokio::test]
async fn retries_back_off_while_broker_is_down() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let writer = OutboxWriter::new(store.clone());
    let relay = PublisherRelay::new(store.clone(), broker.clone(), relay_config("relay-1"));
    writer.create_order(order_request("u1")).await.unwrap();

    broker.set_available(false);
    let mut attempts = Vec::new();
    let mut delays = Vec::new();
    while attempts.len() < 4 {
        let result = relay.drain_once().await.unwrap();
        if result.claimed > 0 {
            assert!(result.connection_lost);
            let event = &store.outbox_events()[0];
            attempts.push(event.attempts);
            delays.push(event.next_attempt_at.unwrap() - event.last_attempt_at.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(attempts, vec![1, 2, 3, 4]);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");

    broker.set_available(true);
    tokio::time::sleep(Duration::from_millis(250)).await;
    let result = relay.drain_once().await.unwrap();
    assert_eq!(result.published, 1);
    let event = &store.outbox_events()[0];
    assert!(event.is_published());
    assert_eq!(event.attempts, 5);
}

#[tokio::test]
async fn supervisor_degrades_then_recovers() {
    let broker = InMemoryBroker::new();
    let supervisor = ConnectionSupervisor::new(
        broker.clone(),
        SupervisorConfig::new("broker")
            .with_backoff(fast_backoff())
            .with_retry_window(Duration::from_millis(60))
            .with_probe_interval(Duration::from_millis(20)),
    );
    let mut states = supervisor.subscribe();

    broker.set_available(false);
    let err = supervisor.ensure_connected().await.unwrap_err();
    assert!(matches!(err, SupervisorError::Degraded { .. }));
    assert!(supervisor.health().is_degraded());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Degraded);

    broker.set_available(true);
    tokio::time::sleep(Duration::from_millis(30)).await;
    supervisor.ensure_connected().await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn spawned_relay_resumes_after_outage() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let writer = OutboxWriter::new(store.clone());
    let handle = PublisherRelay::new(store.clone(), broker.clone(), relay_config("relay-1"))
        .spawn(crate::support::broker_supervisor(&broker));

    broker.set_available(false);
    writer.create_order(order_request("u1")).await.unwrap();
    writer.create_order(order_request("u2")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.outbox_events().iter().all(|e| !e.is_published()));

    broker.set_available(true);
    crate::support::eventually("both events published", || {
        store.outbox_events().iter().all(|e| e.is_published())
    })
    .await;

    let stats = handle.stop().await;
    assert_eq!(stats.published, 2);
}
