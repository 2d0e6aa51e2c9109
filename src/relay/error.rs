use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("outbox unavailable: {0}")]
    Storage(#[from] StoreError),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Storage(e) => e.kind(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        match self {
            RelayError::Storage(e) => e.is_unavailable(),
        }
    }
}
