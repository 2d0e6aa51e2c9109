use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("{name} is degraded")]
    Degraded { name: String },
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Degraded
    }
}
