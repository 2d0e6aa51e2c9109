//! Orders accepted by the intake.
//!
//! An `Order` is created once from a validated `CreateOrder` request and never
//! mutated afterwards. Its id is generated server-side and never reused.

mod order;

pub use order::{CreateOrder, Order, ValidationError};
