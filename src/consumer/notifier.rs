use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::order::Order;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// The notification side effect run once per processed event.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, order: &Order, event_id: &str) -> Result<(), NotifyError>;
}

/// Logs each order it is asked to notify about.
///
/// With a buffer attached, the rendered lines are also collected there.
#[derive(Clone, Default)]
pub struct LogNotifier {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, order: &Order, event_id: &str) -> Result<(), NotifyError> {
        info!(
            event_id,
            order_id = %order.id,
            user_id = %order.user_id,
            product = %order.product,
            quantity = order.quantity,
            "received order"
        );
        if let Some(buffer) = &self.buffer {
            let mut buffer = buffer
                .lock()
                .map_err(|_| NotifyError("log buffer poisoned".into()))?;
            buffer.push(format!(
                "[NOTIFY] {} order={} user={} product={} quantity={}",
                event_id, order.id, order.user_id, order.product, order.quantity
            ));
        }
        Ok(())
    }
}
