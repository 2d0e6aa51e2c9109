//! Message bus - broker abstractions used by the relay and the consumer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  publish(topic, msg)  ┌──────────────────┐  poll()  ┌──────────────┐
//! │ Relay        │ ────────────────────▶ │ Broker           │ ───────▶ │ Consumer     │
//! │ (Publisher)  │                       │ queue per topic  │ ◀─────── │ (Subscriber) │
//! └──────────────┘                       └──────────────────┘ ack/nack └──────────────┘
//!                                                 │
//!                                                 ▼
//!                                          dead letters
//! ```
//!
//! Subscribers on the same topic compete for messages. A delivery that is
//! not acknowledged before the connection drops is redelivered, so handlers
//! must be idempotent.

mod error;
mod in_memory_broker;
mod message;
mod publisher;
mod subscriber;

pub use error::BrokerError;
pub use in_memory_broker::{DeadLetter, InMemoryBroker, InMemorySubscription};
pub use message::{Delivery, Message};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
