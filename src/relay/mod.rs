//! Publisher relay - drains the outbox to the broker.
//!
//! Each drain cycle claims a bounded batch of due events under a lease,
//! publishes each one, and records the outcome:
//!
//! - broker accepted: `mark_published`
//! - broker failed: `mark_failed` with `next_attempt_at` from the backoff
//!   policy; after `max_attempts` the event stays `FAILED` for an operator
//! - connection lost: the failing event is marked failed, the rest of the
//!   batch is released, and the broker supervisor is told
//!
//! A crash between publishing and marking leaves the claim in place; once
//! the lease expires the event is claimed and published again. Delivery is
//! at-least-once.

mod config;
mod error;
mod relay;

pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::{DrainResult, PublisherRelay, RelayHandle, RelayStats};
