//! Connection supervisor - owns the connection state of one dependency.
//!
//! - `Disconnected`: no live connection. The next `ensure_connected` call
//!   starts a reconnect loop.
//! - `Connecting`: the reconnect loop is probing with exponential backoff.
//! - `Connected`: the last probe or operation succeeded. `report_failure`
//!   moves back to `Disconnected`.
//! - `Degraded`: the retry window elapsed without a successful probe. Calls
//!   fail fast except for one half-open probe per `probe_interval`; a
//!   successful probe returns to `Connected`.
//!
//! Every component that talks to a dependency holds an `Arc` of that
//! dependency's supervisor; there are no global connection handles.

mod connector;
mod error;
mod supervisor;

pub use connector::{ConnectError, Connector};
pub use error::SupervisorError;
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, HealthCheck, HealthStatus, Supervisor, SupervisorConfig,
};
