use async_trait::async_trait;
use thiserror::Error;

/// A failed attempt to reach an external dependency.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{dependency}: {reason}")]
pub struct ConnectError {
    pub dependency: String,
    pub reason: String,
}

impl ConnectError {
    pub fn new(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }
}

/// Something a `ConnectionSupervisor` can (re)connect to.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish or verify the connection.
    async fn probe(&self) -> Result<(), ConnectError>;
}
