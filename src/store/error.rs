use thiserror::Error;

use crate::error::ErrorKind;
use crate::outbox::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate key {key} in {collection}")]
    Duplicate {
        collection: &'static str,
        key: String,
    },

    #[error("{key} not found in {collection}")]
    NotFound {
        collection: &'static str,
        key: String,
    },

    #[error("{event_id} is not claimed by {owner}")]
    NotOwner { event_id: String, owner: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Storage
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
