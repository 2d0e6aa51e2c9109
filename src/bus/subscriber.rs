use std::time::Duration;

use async_trait::async_trait;

use super::{BrokerError, Delivery};

/// Pull-based consumer of one topic.
///
/// Every delivery must be settled exactly once with `ack`, `nack` or
/// `dead_letter`. Deliveries left unsettled when the connection drops are
/// redelivered with a higher `attempt`.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Wait up to `timeout` for the next delivery.
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// The message was handled; remove it.
    async fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    /// The message was not handled. With `requeue` it is redelivered later,
    /// otherwise it is dead-lettered.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Park the message for an operator.
    async fn dead_letter(&self, tag: u64, reason: &str) -> Result<(), BrokerError>;
}
