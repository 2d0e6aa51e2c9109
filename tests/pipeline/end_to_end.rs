//! Order intake through to notification with every component running.

use order_events::store::{InMemoryStore, ProcessedStore};
use order_events::{IdempotentConsumer, InMemoryBroker, OutboxWriter, PublisherRelay, ORDER_CREATED_TOPIC};

use crate::support::{
    broker_supervisor, consumer_config, eventually, order_request, relay_config, RecordingNotifier,
};

#[tokio::test]
async fn created_order_is_notified_once() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let supervisor = broker_supervisor(&broker);
    let notifier = RecordingNotifier::default();

    let relay = PublisherRelay::new(store.clone(), broker.clone(), relay_config("relay-1"))
        .spawn(supervisor.clone());
    let consumer = IdempotentConsumer::new(store.clone(), notifier.clone(), consumer_config("c1"))
        .spawn(broker.subscribe(ORDER_CREATED_TOPIC), supervisor);

    let writer = OutboxWriter::new(store.clone());
    let order = writer.create_order(order_request("u1")).await.unwrap();
    let event_id = store.outbox_events()[0].event_id.clone();

    eventually("notification", || notifier.count() == 1).await;
    eventually("ack", || broker.acknowledged().len() == 1).await;

    let relay_stats = relay.stop().await;
    let consumer_stats = consumer.stop().await;

    assert_eq!(notifier.notified.lock().unwrap()[0], event_id);
    assert!(store.outbox_events()[0].is_published());
    assert!(store.get_processed(&event_id).await.unwrap().is_some());
    assert_eq!(relay_stats.published, 1);
    assert_eq!(consumer_stats.acked, 1);

    let published = broker.published(ORDER_CREATED_TOPIC);
    assert_eq!(published[0].metadata("aggregate_id"), Some(order.id.as_str()));
}
