use std::time::Duration;

use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::error::ErrorKind;
use crate::order::ValidationError;
use crate::store::StoreError;
use crate::supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order not persisted: {0}")]
    Storage(#[from] StoreError),

    #[error("could not encode event: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("order not persisted within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Degraded(#[from] SupervisorError),
}

impl OutboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OutboxError::Validation(_) => ErrorKind::Validation,
            OutboxError::Storage(e) => e.kind(),
            OutboxError::Envelope(_) => ErrorKind::Storage,
            OutboxError::Timeout(_) => ErrorKind::Timeout,
            OutboxError::Degraded(e) => e.kind(),
        }
    }
}
