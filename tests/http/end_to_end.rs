//! `POST /orders` through relay and broker to the notification consumer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use order_events::http::AppState;
use order_events::store::{InMemoryStore, ProcessedStore};
use order_events::supervisor::{ConnectionSupervisor, SupervisorConfig};
use order_events::{
    ConsumerConfig, IdempotentConsumer, InMemoryBroker, LogNotifier, OutboxWriter,
    PublisherRelay, RelayConfig, ORDER_CREATED_TOPIC,
};
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::support::{impatient_supervisor, start_with_state};

#[tokio::test]
async fn posted_order_reaches_the_notifier() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let broker_supervisor = Arc::new(ConnectionSupervisor::new(
        broker.clone(),
        SupervisorConfig::new("broker"),
    ));
    let store_supervisor = impatient_supervisor(&store);
    let lines = Arc::new(Mutex::new(Vec::new()));

    let relay = PublisherRelay::new(
        store.clone(),
        broker.clone(),
        RelayConfig::default().with_poll_interval(Duration::from_millis(5)),
    )
    .with_store_supervisor(store_supervisor.clone())
    .spawn(broker_supervisor.clone());
    let consumer = IdempotentConsumer::new(
        store.clone(),
        LogNotifier::with_buffer(lines.clone()),
        ConsumerConfig::default().with_poll_timeout(Duration::from_millis(20)),
    )
    .with_store_supervisor(store_supervisor.clone())
    .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor.clone());

    let writer = OutboxWriter::new(store.clone()).with_supervisor(store_supervisor.clone());
    let state = AppState::new(Arc::new(writer), Duration::from_secs(5))
        .with_dependency(store_supervisor.clone())
        .with_dependency(broker_supervisor.clone());
    let server = start_with_state(store.clone(), store_supervisor, state).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let order: Value = resp.json().await.unwrap();
    let order_id = order["id"].as_str().unwrap().to_string();

    let deadline = Instant::now() + Duration::from_secs(5);
    while lines.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "order was never notified");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    relay.stop().await;
    consumer.stop().await;

    let lines = lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(&format!("order={order_id}")));
    assert!(lines[0].contains("quantity=2"));

    let event = &store.outbox_events()[0];
    assert!(event.is_published());
    assert!(store.get_processed(&event.event_id).await.unwrap().is_some());
}
