use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected message: {0}")]
    Rejected(String),

    #[error("broker did not confirm in time")]
    Timeout,

    #[error("unknown delivery tag {0}")]
    UnknownDelivery(u64),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BrokerTransient
    }

    /// Whether the connection itself is gone, as opposed to a single
    /// operation failing on a healthy connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Timeout)
    }
}
