//! Messages that can never succeed end up in the dead-letter destination.

use order_events::bus::{Message, Publisher};
use order_events::store::{InMemoryStore, ProcessedStore};
use order_events::{EventEnvelope, IdempotentConsumer, InMemoryBroker, Order, ORDER_CREATED_TOPIC};

use crate::support::{broker_supervisor, consumer_config, eventually, FailingNotifier, RecordingNotifier};

#[tokio::test]
async fn poison_message_is_dead_lettered_after_max_deliveries() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let notifier = FailingNotifier::default();
    let handle = IdempotentConsumer::new(store.clone(), notifier.clone(), consumer_config("c1"))
        .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor(&broker));

    let order = Order {
        id: "o1".into(),
        user_id: "u1".into(),
        product: "p1".into(),
        quantity: 2,
    };
    let envelope = EventEnvelope::order_created(&order, "evt-1", chrono::Utc::now());
    broker
        .publish(
            ORDER_CREATED_TOPIC,
            Message::new("evt-1", "order.created", envelope.encode().unwrap()),
        )
        .await
        .unwrap();

    eventually("dead letter", || broker.dead_letters().len() == 1).await;
    let stats = handle.stop().await;

    let parked = &broker.dead_letters()[0];
    assert_eq!(parked.attempt, 3);
    assert!(parked.reason.starts_with("POISON_MESSAGE"), "{}", parked.reason);
    assert_eq!(notifier.calls(), 3);
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.dead_lettered, 1);
    assert!(store.get_processed("evt-1").await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_message_is_dead_lettered_immediately() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let notifier = RecordingNotifier::default();
    let handle = IdempotentConsumer::new(store.clone(), notifier.clone(), consumer_config("c1"))
        .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor(&broker));

    broker
        .publish(
            ORDER_CREATED_TOPIC,
            Message::new("m1", "order.created", b"<order/>".to_vec()),
        )
        .await
        .unwrap();

    eventually("dead letter", || broker.dead_letters().len() == 1).await;
    handle.stop().await;

    let parked = &broker.dead_letters()[0];
    assert_eq!(parked.attempt, 1);
    assert!(parked.reason.starts_with("MALFORMED_MESSAGE"), "{}", parked.reason);
    assert_eq!(notifier.count(), 0);
}
