//! Redeliveries and competing consumers never repeat the side effect.

use std::time::Duration;

use order_events::bus::{Message, Publisher, Subscriber};
use order_events::store::{InMemoryStore, ProcessedStore};
use order_events::{
    Disposition, EventEnvelope, IdempotentConsumer, InMemoryBroker, Order, ORDER_CREATED_TOPIC,
};

use crate::support::{broker_supervisor, consumer_config, eventually, RecordingNotifier};

fn order_created(event_id: &str) -> Message {
    let order = Order {
        id: format!("order-{event_id}"),
        user_id: "u1".into(),
        product: "p1".into(),
        quantity: 2,
    };
    let envelope = EventEnvelope::order_created(&order, event_id, chrono::Utc::now());
    Message::new(event_id, "order.created", envelope.encode().unwrap())
}

#[tokio::test]
async fn redelivered_event_notifies_once_across_consumers() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let supervisor = broker_supervisor(&broker);
    let notifier = RecordingNotifier::slow(Duration::from_millis(50));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            IdempotentConsumer::new(
                store.clone(),
                notifier.clone(),
                consumer_config(&format!("consumer-{i}")).with_workers(2),
            )
            .spawn(broker.subscribe(ORDER_CREATED_TOPIC), supervisor.clone())
        })
        .collect();

    for _ in 0..5 {
        broker.publish(ORDER_CREATED_TOPIC, order_created("evt-1")).await.unwrap();
    }

    eventually("all five copies acknowledged", || broker.acknowledged().len() == 5).await;
    assert_eq!(notifier.count(), 1);
    assert_eq!(store.processed_count().await.unwrap(), 1);
    assert!(broker.dead_letters().is_empty());

    for handle in handles {
        handle.stop().await;
    }
}

#[tokio::test]
async fn duplicate_copies_notify_once_within_one_consumer() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let notifier = RecordingNotifier::slow(Duration::from_millis(50));
    let handle = IdempotentConsumer::new(
        store.clone(),
        notifier.clone(),
        consumer_config("c1").with_workers(4),
    )
    .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor(&broker));

    for _ in 0..4 {
        broker.publish(ORDER_CREATED_TOPIC, order_created("evt-1")).await.unwrap();
    }

    eventually("all four copies acknowledged", || broker.acknowledged().len() == 4).await;
    let stats = handle.stop().await;
    assert_eq!(notifier.count(), 1);
    assert_eq!(store.processed_count().await.unwrap(), 1);
    assert_eq!(stats.acked, 4);
    assert!(broker.dead_letters().is_empty());
}

#[tokio::test]
async fn connection_drop_redelivers_without_repeating_work() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let notifier = RecordingNotifier::default();
    let consumer = IdempotentConsumer::new(store.clone(), notifier.clone(), consumer_config("c1"));
    let subscription = broker.subscribe(ORDER_CREATED_TOPIC);

    broker.publish(ORDER_CREATED_TOPIC, order_created("evt-1")).await.unwrap();

    // Processed, but the ack is lost with the connection.
    let delivery = subscription.poll(Duration::from_millis(50)).await.unwrap().unwrap();
    consumer.on_message(&delivery).await;
    broker.set_available(false);
    assert!(subscription.ack(delivery.tag).await.is_err());
    broker.set_available(true);

    let redelivered = subscription.poll(Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(redelivered.attempt, 2);
    assert_eq!(consumer.on_message(&redelivered).await, Disposition::Ack);
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn distinct_events_are_each_processed() {
    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();
    let notifier = RecordingNotifier::default();
    let handle = IdempotentConsumer::new(store.clone(), notifier.clone(), consumer_config("c1"))
        .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor(&broker));

    for i in 0..10 {
        broker
            .publish(ORDER_CREATED_TOPIC, order_created(&format!("evt-{i}")))
            .await
            .unwrap();
    }

    eventually("ten acks", || broker.acknowledged().len() == 10).await;
    let stats = handle.stop().await;
    assert_eq!(stats.acked, 10);
    assert_eq!(notifier.count(), 10);
}
