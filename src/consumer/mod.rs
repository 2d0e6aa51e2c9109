//! Idempotent consumer - turns `order.created` deliveries into notifications.
//!
//! ```text
//! delivery ─▶ decode ─▶ try_claim ─┬─ AlreadyProcessed ─────────────────▶ ack
//!    │          │                  ├─ InFlight ──────────────▶ requeue after backoff
//!    │          ▼                  └─ Claimed ─▶ notify ─┬─ ok ─▶ record ─▶ ack
//!    │     dead-letter                                   └─ err ─▶ fail_claim ─▶ requeue,
//!    │     (malformed)                                     or dead-letter after
//!    │                                                     max_deliveries failures
//! ```
//!
//! A live claim blocks every worker, including other workers of the same
//! consumer. Only notifier failures count toward `max_deliveries`; the count
//! lives on the claim, so it survives redelivery to another instance.
//!
//! The processed record is insert-only and unique by event id, so two
//! instances racing on the same event never both record it; the loser treats
//! its duplicate insert as "already processed".

mod config;
mod consumer;
mod error;
mod notifier;

pub use config::ConsumerConfig;
pub use consumer::{ConsumerHandle, ConsumerStats, Disposition, IdempotentConsumer};
pub use error::ConsumeError;
pub use notifier::{LogNotifier, NotifyError, Notifier};
