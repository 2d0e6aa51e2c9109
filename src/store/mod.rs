//! Document store - orders, outbox and processed-event collections.
//!
//! The store is split into three traits by who writes to it:
//!
//! ```text
//! ┌──────────────┐   insert_order_with_event   ┌──────────────────────────┐
//! │ OutboxWriter │ ──────────────────────────▶ │ orders + outbox (1 unit) │
//! └──────────────┘                             └──────────────────────────┘
//! ┌──────────────┐   claim_due / mark_*        ┌──────────────────────────┐
//! │ Relay        │ ──────────────────────────▶ │ outbox                   │
//! └──────────────┘                             └──────────────────────────┘
//! ┌──────────────┐   try_claim / record_*      ┌──────────────────────────┐
//! │ Consumer     │ ──────────────────────────▶ │ claims + processed       │
//! └──────────────┘                             └──────────────────────────┘
//! ```
//!
//! `InMemoryStore` implements all three and is what the tests and the demo
//! binary run against.

mod error;
mod in_memory;
mod store;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use store::{
    ClaimOutcome, ClaimRequest, OrderStore, OutboxStore, ProcessedEventRecord, ProcessedStore,
    ProcessingClaim,
};
