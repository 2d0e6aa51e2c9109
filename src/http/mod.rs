//! HTTP transport for order intake. Requires the `http` feature.
//!
//! ## Routes
//!
//! - `POST /orders` (and the legacy `POST /order`) - create an order. Body
//!   `{ "user_id", "product", "quantity" }`; `201` with the order on success.
//! - `GET /health` - `{ "status": "ok" | "degraded", "dependencies": [...] }`.
//!
//! | Failure                         | Status |
//! |---------------------------------|--------|
//! | malformed JSON, invalid fields  | 400    |
//! | store commit failed             | 500    |
//! | a dependency is degraded        | 503    |
//! | deadline expired                | 504    |
//!
//! A caller may shorten the deadline with the `x-request-timeout-ms`
//! header; it is capped by the configured request timeout.

mod error;
mod router;

pub use error::ApiError;
pub use router::{router, serve, serve_on, AppState, REQUEST_TIMEOUT_HEADER};
