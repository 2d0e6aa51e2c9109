use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Inbound request to create an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub user_id: String,
    pub product: String,
    pub quantity: i64,
}

/// One or more fields of a `CreateOrder` were invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order: {}", .problems.join("; "))]
pub struct ValidationError {
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl CreateOrder {
    pub fn new(user_id: impl Into<String>, product: impl Into<String>, quantity: i64) -> Self {
        Self {
            user_id: user_id.into(),
            product: product.into(),
            quantity,
        }
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut problems = Vec::new();

        if self.user_id.trim().is_empty() {
            problems.push("user_id must not be empty".to_string());
        }
        if self.product.trim().is_empty() {
            problems.push("product must not be empty".to_string());
        }
        if self.quantity < 1 {
            problems.push(format!("quantity must be >= 1, got {}", self.quantity));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { problems })
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub product: String,
    pub quantity: i64,
}

impl Order {
    /// Validate the request and assign the given id.
    pub fn from_request(request: CreateOrder, id: impl Into<String>) -> Result<Self, ValidationError> {
        request.validate()?;
        Ok(Self {
            id: id.into(),
            user_id: request.user_id,
            product: request.product,
            quantity: request.quantity,
        })
    }
}
