//! Transactional outbox - order intake and the events it records.
//!
//! Creating an order writes two rows in one atomic unit: the order itself and
//! an `OutboxEvent` holding the encoded `order.created` envelope. Nothing
//! talks to the broker here; the relay drains the outbox afterwards.
//!
//! ## Example
//!
//! ```
//! use order_events::order::CreateOrder;
//! use order_events::outbox::OutboxWriter;
//! use order_events::store::{InMemoryStore, OutboxStore};
//! use order_events::outbox::OutboxStatus;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! let writer = OutboxWriter::new(store.clone());
//!
//! let order = writer.create_order(CreateOrder::new("u1", "p1", 2)).await.unwrap();
//! let pending = store.events_by_status(OutboxStatus::Pending).await.unwrap();
//! assert_eq!(pending[0].aggregate_id, order.id);
//! # });
//! ```

mod error;
mod event;
mod writer;

pub use error::OutboxError;
pub use event::{OutboxEvent, OutboxStatus, TransitionError};
pub use writer::OutboxWriter;
