use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{OutboxError, OutboxEvent};
use crate::envelope::EventEnvelope;
use crate::order::{CreateOrder, Order};
use crate::store::OrderStore;
use crate::supervisor::Supervisor;

/// Accepts new orders and records their `order.created` event in the outbox.
pub struct OutboxWriter<S> {
    store: S,
    supervisor: Option<Arc<dyn Supervisor>>,
}

impl<S: OrderStore> OutboxWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            supervisor: None,
        }
    }

    /// Check the store connection before each commit and report outages to
    /// `supervisor`. While it is degraded, orders fail with
    /// `OutboxError::Degraded`.
    pub fn with_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate the request, then commit the order and its outbox event
    /// together. Either both become visible or neither does.
    pub async fn create_order(&self, request: CreateOrder) -> Result<Order, OutboxError> {
        let order = Order::from_request(request, Uuid::new_v4().to_string())?;
        let envelope = EventEnvelope::order_created(&order, Uuid::new_v4().to_string(), Utc::now());
        let event = OutboxEvent::pending(&envelope, envelope.encode()?);

        if let Some(supervisor) = &self.supervisor {
            supervisor.ensure_connected().await?;
        }

        if let Err(err) = self.store.insert_order_with_event(&order, &event).await {
            warn!(order_id = %order.id, event_id = %event.event_id, error = %err, "order commit failed");
            if err.is_unavailable() {
                if let Some(supervisor) = &self.supervisor {
                    supervisor.report_failure("order commit: store unavailable");
                }
            }
            return Err(err.into());
        }

        info!(order_id = %order.id, event_id = %event.event_id, "order created");
        Ok(order)
    }

    /// Like `create_order`, but gives up once `deadline` elapses.
    pub async fn create_order_within(
        &self,
        request: CreateOrder,
        deadline: Duration,
    ) -> Result<Order, OutboxError> {
        match tokio::time::timeout(deadline, self.create_order(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "order creation timed out");
                Err(OutboxError::Timeout(deadline))
            }
        }
    }
}
