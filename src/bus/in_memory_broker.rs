//! In-memory broker for testing and single-process scenarios.
//!
//! Behaves like a work queue: one queue per topic, competing subscribers,
//! explicit settlement of every delivery, and redelivery of anything left
//! unsettled when the connection drops.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{BrokerError, Delivery, Message, Publisher, Subscriber};
use crate::supervisor::{ConnectError, Connector};

/// A message parked for operator attention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetter {
    pub topic: String,
    pub message: Message,
    pub reason: String,
    /// Delivery attempt on which the message was dead-lettered.
    pub attempt: u32,
}

struct Queued {
    message: Message,
    /// Deliveries made so far.
    deliveries: u32,
}

struct Unacked {
    topic: String,
    message: Message,
    deliveries: u32,
}

struct BrokerState {
    available: bool,
    fail_publishes: usize,
    queues: HashMap<String, VecDeque<Queued>>,
    unacked: HashMap<u64, Unacked>,
    next_tag: u64,
    published: Vec<(String, Message)>,
    acked: Vec<String>,
    dead_letters: Vec<DeadLetter>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            available: true,
            fail_publishes: 0,
            queues: HashMap::new(),
            unacked: HashMap::new(),
            next_tag: 0,
            published: Vec::new(),
            acked: Vec::new(),
            dead_letters: Vec::new(),
        }
    }
}

impl BrokerState {
    fn check_available(&self) -> Result<(), BrokerError> {
        if self.available {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("connection closed".into()))
        }
    }

    fn take_unacked(&mut self, tag: u64) -> Result<Unacked, BrokerError> {
        self.unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))
    }
}

/// In-memory broker.
///
/// Cloning returns another handle to the same queues.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use order_events::bus::{InMemoryBroker, Message, Publisher, Subscriber};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let broker = InMemoryBroker::new();
/// let subscription = broker.subscribe("order.created");
///
/// broker
///     .publish("order.created", Message::new("evt-1", "order.created", b"{}".to_vec()))
///     .await
///     .unwrap();
///
/// let delivery = subscription.poll(Duration::from_millis(10)).await.unwrap().unwrap();
/// assert_eq!(delivery.message.id, "evt-1");
/// assert_eq!(delivery.attempt, 1);
/// subscription.ack(delivery.tag).await.unwrap();
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    ready: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscriber on `topic`. Subscribers on the same topic compete
    /// for messages.
    pub fn subscribe(&self, topic: impl Into<String>) -> InMemorySubscription {
        InMemorySubscription {
            broker: self.clone(),
            topic: topic.into(),
        }
    }

    /// Simulate dropping (or restoring) the connection. Dropping it returns
    /// every unsettled delivery to the front of its queue for redelivery.
    pub fn set_available(&self, available: bool) {
        {
            let mut state = self.lock();
            state.available = available;
            if !available {
                let mut unacked: Vec<_> = state.unacked.drain().collect();
                unacked.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
                for (_, u) in unacked {
                    state.queues.entry(u.topic).or_default().push_front(Queued {
                        message: u.message,
                        deliveries: u.deliveries,
                    });
                }
            }
        }
        self.ready.notify_waiters();
    }

    /// Make the next `count` publishes fail with `BrokerError::Rejected`.
    pub fn fail_next_publishes(&self, count: usize) {
        self.lock().fail_publishes = count;
    }

    /// Every message accepted on `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Ids of acknowledged messages, in ack order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    /// Messages waiting on `topic`, not counting unsettled deliveries.
    pub fn queue_len(&self, topic: &str) -> usize {
        self.lock().queues.get(topic).map_or(0, VecDeque::len)
    }

    pub fn unacked_len(&self) -> usize {
        self.lock().unacked.len()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_deliver(&self, topic: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.lock();
        state.check_available()?;

        let Some(queued) = state.queues.get_mut(topic).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        state.next_tag += 1;
        let tag = state.next_tag;
        let attempt = queued.deliveries + 1;
        state.unacked.insert(
            tag,
            Unacked {
                topic: topic.to_string(),
                message: queued.message.clone(),
                deliveries: attempt,
            },
        );

        Ok(Some(Delivery {
            tag,
            message: queued.message,
            attempt,
        }))
    }

    fn settle(
        &self,
        tag: u64,
        apply: impl FnOnce(&mut BrokerState, Unacked),
    ) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            state.check_available()?;
            let unacked = state.take_unacked(tag)?;
            apply(&mut state, unacked);
        }
        self.ready.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            state.check_available()?;
            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                return Err(BrokerError::Rejected("injected publish failure".into()));
            }
            state.published.push((topic.to_string(), message.clone()));
            state
                .queues
                .entry(topic.to_string())
                .or_default()
                .push_back(Queued {
                    message,
                    deliveries: 0,
                });
        }
        self.ready.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn probe(&self) -> Result<(), ConnectError> {
        self.lock()
            .check_available()
            .map_err(|e| ConnectError::new("broker", e.to_string()))
    }
}

/// A competing consumer on one topic of an `InMemoryBroker`.
#[derive(Clone)]
pub struct InMemorySubscription {
    broker: InMemoryBroker,
    topic: String,
}

impl InMemorySubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Subscriber for InMemorySubscription {
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.broker.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.broker.try_deliver(&self.topic)? {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.broker
            .settle(tag, |state, unacked| state.acked.push(unacked.message.id))
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.broker.settle(tag, |state, unacked| {
            if requeue {
                state
                    .queues
                    .entry(unacked.topic)
                    .or_default()
                    .push_back(Queued {
                        message: unacked.message,
                        deliveries: unacked.deliveries,
                    });
            } else {
                state.dead_letters.push(DeadLetter {
                    topic: unacked.topic,
                    message: unacked.message,
                    reason: "rejected".into(),
                    attempt: unacked.deliveries,
                });
            }
        })
    }

    async fn dead_letter(&self, tag: u64, reason: &str) -> Result<(), BrokerError> {
        self.broker.settle(tag, |state, unacked| {
            state.dead_letters.push(DeadLetter {
                topic: unacked.topic,
                message: unacked.message,
                reason: reason.to_string(),
                attempt: unacked.deliveries,
            });
        })
    }
}
