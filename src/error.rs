use std::fmt;

use serde::Serialize;

/// Failure classes shared by every component.
///
/// Each module keeps its own error enum; `kind()` on those errors maps them
/// into this taxonomy so transports and logs can treat failures uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// Store failure. Reads are retried, write-path failures reach the caller.
    Storage,
    /// Broker failure. Retried with backoff by the relay and supervisor.
    BrokerTransient,
    /// Undecodable message. Dead-lettered.
    MalformedMessage,
    /// Message that exceeded its redelivery limit. Dead-lettered.
    PoisonMessage,
    /// A dependency is degraded; new work is refused until it recovers.
    Degraded,
    /// The caller's deadline expired before the operation completed.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::BrokerTransient => "BROKER_TRANSIENT",
            ErrorKind::MalformedMessage => "MALFORMED_MESSAGE",
            ErrorKind::PoisonMessage => "POISON_MESSAGE",
            ErrorKind::Degraded => "DEGRADED",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    /// Whether an operation failing with this kind may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Storage | ErrorKind::BrokerTransient | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
