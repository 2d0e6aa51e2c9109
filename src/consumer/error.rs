use thiserror::Error;

use super::NotifyError;
use crate::envelope::EnvelopeError;
use crate::error::ErrorKind;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Malformed(#[from] EnvelopeError),

    #[error("unknown event type {0}")]
    UnknownEventType(String),

    #[error("processed ledger unavailable: {0}")]
    Storage(#[from] StoreError),

    #[error("event {event_id}: {source}")]
    Notify {
        event_id: String,
        /// Side-effect failures recorded for the event so far; 0 if the
        /// failure could not be recorded.
        failures: u32,
        #[source]
        source: NotifyError,
    },

    #[error("event {event_id} failed {failures} times: {source}")]
    Poison {
        event_id: String,
        failures: u32,
        #[source]
        source: NotifyError,
    },
}

impl ConsumeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsumeError::Malformed(_) | ConsumeError::UnknownEventType(_) => {
                ErrorKind::MalformedMessage
            }
            ConsumeError::Storage(e) => e.kind(),
            // Retried through broker redelivery.
            ConsumeError::Notify { .. } => ErrorKind::BrokerTransient,
            ConsumeError::Poison { .. } => ErrorKind::PoisonMessage,
        }
    }

    /// Whether the message can never succeed and belongs in the dead-letter
    /// destination.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedMessage | ErrorKind::PoisonMessage
        )
    }
}
