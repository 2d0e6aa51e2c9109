//! Event envelope - the typed payload placed on the wire.
//!
//! ```text
//! {
//!   "event_id": "6f1c…",
//!   "event_type": "order.created",
//!   "occurred_at": "2026-01-01T12:00:00Z",
//!   "payload": { "id": "…", "user_id": "u1", "product": "p1", "quantity": 2 }
//! }
//! ```
//!
//! Decoding ignores unknown fields and accepts an optional `version`, so
//! producers can extend the envelope without breaking running consumers.

mod envelope;

pub use envelope::{EnvelopeError, EventEnvelope, EventType, ORDER_CREATED_TOPIC};
