use async_trait::async_trait;

use super::{BrokerError, Message};

/// Publishes messages to a named topic.
///
/// `InMemoryBroker` is the only implementation in this crate, for tests and
/// single-process runs. A client for a real broker (RabbitMQ with publisher
/// confirms, Kafka with `acks=all`) implements this trait outside the crate.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a message. With confirms enabled, `Ok` means the broker has
    /// taken responsibility for the message.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError>;

    /// Whether `Ok` from `publish` is backed by a broker confirm. Without
    /// confirms a message can be lost between a successful return and the
    /// broker persisting it.
    fn confirms(&self) -> bool {
        true
    }
}
