//! Reliable publication and idempotent consumption of order events.
//!
//! ```text
//! POST /orders ─▶ OutboxWriter ─▶ store (order + outbox, one unit)
//!                                        │
//!                                  PublisherRelay ─▶ broker ─▶ IdempotentConsumer ─▶ Notifier
//! ```
//!
//! The store and broker are reached through traits; `InMemoryStore` and
//! `InMemoryBroker` implement them for tests and the demo binary. Each
//! external dependency is owned by a `ConnectionSupervisor`.

pub mod backoff;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod order;
pub mod outbox;
pub mod relay;
pub mod store;
pub mod supervisor;

pub use backoff::{Backoff, BackoffError};
pub use bus::{BrokerError, Delivery, InMemoryBroker, Message, Publisher, Subscriber};
pub use config::AppConfig;
pub use consumer::{
    ConsumeError, ConsumerConfig, ConsumerHandle, ConsumerStats, Disposition, IdempotentConsumer,
    LogNotifier, Notifier, NotifyError,
};
pub use envelope::{EnvelopeError, EventEnvelope, EventType, ORDER_CREATED_TOPIC};
pub use error::ErrorKind;
pub use order::{CreateOrder, Order, ValidationError};
pub use outbox::{OutboxError, OutboxEvent, OutboxStatus, OutboxWriter};
pub use relay::{DrainResult, PublisherRelay, RelayConfig, RelayError, RelayHandle, RelayStats};
pub use store::{InMemoryStore, OrderStore, OutboxStore, ProcessedStore, StoreError};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, Connector, HealthCheck, HealthStatus, Supervisor,
    SupervisorConfig, SupervisorError,
};
