//! Order and outbox event are committed together or not at all.

use std::collections::HashSet;
use std::sync::Arc;

use order_events::store::{InMemoryStore, OrderStore, OutboxStore};
use order_events::{ErrorKind, OutboxStatus, OutboxWriter};

use crate::support::order_request;

#[tokio::test]
async fn crash_between_writes_leaves_nothing() {
    let store = InMemoryStore::new();
    let writer = OutboxWriter::new(store.clone());

    store.fail_next_commit();
    let err = writer.create_order(order_request("u1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(store.order_count(), 0);
    assert_eq!(store.outbox_count(), 0);

    let order = writer.create_order(order_request("u1")).await.unwrap();
    assert!(store.get_order(&order.id).await.unwrap().is_some());
    let pending = store.events_by_status(OutboxStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].aggregate_id, order.id);
}

#[tokio::test]
async fn every_order_gets_exactly_one_event() {
    let store = InMemoryStore::new();
    let writer = Arc::new(OutboxWriter::new(store.clone()));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let writer = Arc::clone(&writer);
        tasks.push(tokio::spawn(async move {
            writer.create_order(order_request(&format!("u{i}"))).await
        }));
    }

    let mut order_ids = HashSet::new();
    for task in tasks {
        order_ids.insert(task.await.unwrap().unwrap().id);
    }
    assert_eq!(order_ids.len(), 20);

    let events = store.outbox_events();
    assert_eq!(events.len(), 20);
    let aggregates: HashSet<_> = events.iter().map(|e| e.aggregate_id.clone()).collect();
    assert_eq!(aggregates, order_ids);
    let event_ids: HashSet<_> = events.iter().map(|e| e.event_id.clone()).collect();
    assert_eq!(event_ids.len(), 20);
}

#[tokio::test]
async fn snapshot_payload_matches_committed_order() {
    let store = InMemoryStore::new();
    let writer = OutboxWriter::new(store.clone());

    let order = writer.create_order(order_request("u1")).await.unwrap();
    let event = &store.outbox_events()[0];
    let envelope = event.envelope().unwrap();

    assert_eq!(envelope.event_id, event.event_id);
    assert_eq!(envelope.payload, order);
    assert_eq!(event.attempts, 0);
}
