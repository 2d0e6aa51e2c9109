use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{RelayConfig, RelayError};
use crate::bus::{Message, Publisher};
use crate::envelope::ORDER_CREATED_TOPIC;
use crate::outbox::{OutboxEvent, OutboxStatus};
use crate::store::{ClaimRequest, OutboxStore, StoreError};
use crate::supervisor::{ConnectionSupervisor, Connector, Supervisor, SupervisorError};

/// Outcome of one drain cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    /// Failed events that reached `max_attempts` during this cycle.
    pub exhausted: usize,
    /// Claims given back without an attempt after the connection dropped.
    pub released: usize,
    /// Published, but the outcome could not be recorded. These are
    /// published again once their lease expires.
    pub unmarked: usize,
    /// Published to a publisher without broker confirms.
    pub unconfirmed: usize,
    pub connection_lost: bool,
}

/// Totals over the lifetime of a spawned relay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub cycles: usize,
    pub published: usize,
    pub failed: usize,
    pub exhausted: usize,
    pub released: usize,
    pub errors: usize,
}

impl RelayStats {
    fn record(&mut self, result: &DrainResult) {
        self.cycles += 1;
        self.published += result.published;
        self.failed += result.failed;
        self.exhausted += result.exhausted;
        self.released += result.released;
    }
}

/// Moves committed outbox events onto the broker.
pub struct PublisherRelay<S, P> {
    store: S,
    publisher: P,
    config: RelayConfig,
    store_supervisor: Option<Arc<dyn Supervisor>>,
}

impl<S, P> PublisherRelay<S, P>
where
    S: OutboxStore,
    P: Publisher,
{
    pub fn new(store: S, publisher: P, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
            store_supervisor: None,
        }
    }

    /// Supervise the outbox store as well as the broker. A spawned relay
    /// claims nothing while either is unreachable.
    pub fn with_store_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.store_supervisor = Some(supervisor);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn store_failed(&self, err: &StoreError) {
        if err.is_unavailable() {
            if let Some(supervisor) = &self.store_supervisor {
                supervisor.report_failure("outbox store unavailable");
            }
        }
    }

    /// Run one drain cycle.
    pub async fn drain_once(&self) -> Result<DrainResult, RelayError> {
        let request = ClaimRequest {
            owner: self.config.relay_id.clone(),
            limit: self.config.batch_size,
            lease: self.config.lease,
            max_attempts: self.config.max_attempts,
            now: Utc::now(),
        };
        let batch = self.store.claim_due(&request).await.inspect_err(|err| {
            self.store_failed(err);
        })?;

        let mut result = DrainResult {
            claimed: batch.len(),
            ..DrainResult::default()
        };
        if batch.is_empty() {
            return Ok(result);
        }
        debug!(relay_id = %self.config.relay_id, claimed = batch.len(), "claimed outbox batch");

        let mut events = batch.into_iter();
        while let Some(event) = events.next() {
            let message = Message::new(
                event.event_id.clone(),
                event.event_type.as_str(),
                event.payload.clone(),
            )
            .with_metadata("aggregate_id", event.aggregate_id.clone());

            match self.publisher.publish(ORDER_CREATED_TOPIC, message).await {
                Ok(()) => self.record_published(&event, &mut result).await,
                Err(err) => {
                    self.record_failed(&event, &err.to_string(), &mut result)
                        .await;
                    if err.is_connection() {
                        result.connection_lost = true;
                        for rest in events.by_ref() {
                            self.release(&rest, &mut result).await;
                        }
                        break;
                    }
                }
            }
        }

        Ok(result)
    }

    async fn record_published(&self, event: &OutboxEvent, result: &mut DrainResult) {
        if !self.publisher.confirms() {
            result.unconfirmed += 1;
            debug!(event_id = %event.event_id, "published without broker confirm");
        }
        match self
            .store
            .mark_published(&event.event_id, &self.config.relay_id, Utc::now())
            .await
        {
            Ok(()) => {
                result.published += 1;
                info!(
                    event_id = %event.event_id,
                    order_id = %event.aggregate_id,
                    attempt = event.attempts + 1,
                    "event published"
                );
            }
            Err(err) => {
                self.store_failed(&err);
                result.unmarked += 1;
                warn!(
                    event_id = %event.event_id,
                    error = %err,
                    "event published but not marked; it will be published again after its lease expires"
                );
            }
        }
    }

    async fn record_failed(&self, event: &OutboxEvent, reason: &str, result: &mut DrainResult) {
        let attempt = event.attempts + 1;
        let delay = self.config.backoff.delay(attempt);
        let attempted_at = Utc::now();
        let next_attempt_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| attempted_at.checked_add_signed(d))
            .unwrap_or(attempted_at);

        match self
            .store
            .mark_failed(
                &event.event_id,
                &self.config.relay_id,
                reason,
                attempted_at,
                next_attempt_at,
            )
            .await
        {
            Ok(updated) => {
                result.failed += 1;
                if updated.is_exhausted(self.config.max_attempts) {
                    result.exhausted += 1;
                    error!(
                        event_id = %event.event_id,
                        order_id = %event.aggregate_id,
                        attempts = updated.attempts,
                        error = reason,
                        "event exhausted its retries; needs operator attention"
                    );
                } else {
                    warn!(
                        event_id = %event.event_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = reason,
                        "publish failed; retry scheduled"
                    );
                }
            }
            Err(err) => {
                self.store_failed(&err);
                warn!(
                    event_id = %event.event_id,
                    error = %err,
                    "could not record publish failure; event retries after its lease expires"
                );
            }
        }
    }

    async fn release(&self, event: &OutboxEvent, result: &mut DrainResult) {
        match self
            .store
            .release(&event.event_id, &self.config.relay_id)
            .await
        {
            Ok(()) => result.released += 1,
            Err(err) => {
                self.store_failed(&err);
                warn!(event_id = %event.event_id, error = %err, "could not release claim");
            }
        }
    }

    /// Events currently `FAILED`, whether or not they will be retried.
    pub async fn failed_events(&self) -> Result<Vec<OutboxEvent>, RelayError> {
        Ok(self.store.events_by_status(OutboxStatus::Failed).await?)
    }

    /// Failed events that will not be retried without an operator.
    pub async fn exhausted_events(&self) -> Result<Vec<OutboxEvent>, RelayError> {
        let max = self.config.max_attempts;
        Ok(self
            .failed_events()
            .await?
            .into_iter()
            .filter(|e| e.is_exhausted(max))
            .collect())
    }

    /// Put a failed event back in line with a fresh attempt budget.
    pub async fn requeue(&self, event_id: &str) -> Result<(), RelayError> {
        self.store.requeue(event_id).await?;
        info!(event_id, "event requeued by operator");
        Ok(())
    }
}

impl<S, P> PublisherRelay<S, P>
where
    S: OutboxStore + 'static,
    P: Publisher + 'static,
{
    async fn ready<C: Connector>(
        &self,
        broker: &ConnectionSupervisor<C>,
    ) -> Result<(), SupervisorError> {
        broker.ensure_connected().await?;
        if let Some(store) = &self.store_supervisor {
            store.ensure_connected().await?;
        }
        Ok(())
    }

    /// Run drain cycles on a background task until the handle is stopped.
    ///
    /// No work is claimed while `supervisor` cannot reach the broker, or
    /// the store supervisor (if any) cannot reach the store. A cycle that has
    /// started always runs to completion.
    pub fn spawn<C>(self, supervisor: Arc<ConnectionSupervisor<C>>) -> RelayHandle
    where
        C: Connector + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut stats = RelayStats::default();
            info!(relay_id = %self.config.relay_id, "relay started");

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let connected = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    connected = self.ready(&supervisor) => connected,
                };

                let mut backlog = false;
                if connected.is_ok() {
                    match self.drain_once().await {
                        Ok(result) => {
                            stats.record(&result);
                            if result.connection_lost {
                                supervisor.report_failure("publish failed: connection lost");
                            }
                            backlog = !result.connection_lost
                                && result.claimed >= self.config.batch_size;
                        }
                        Err(err) => {
                            stats.errors += 1;
                            warn!(relay_id = %self.config.relay_id, error = %err, "drain cycle failed");
                        }
                    }
                }

                if backlog {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }

            info!(
                relay_id = %self.config.relay_id,
                cycles = stats.cycles,
                published = stats.published,
                failed = stats.failed,
                "relay stopped"
            );
            stats
        });

        RelayHandle {
            stop_tx,
            join: Some(join),
        }
    }
}

/// Handle to a spawned relay.
pub struct RelayHandle {
    stop_tx: watch::Sender<bool>,
    join: Option<JoinHandle<RelayStats>>,
}

impl RelayHandle {
    /// Signal the relay to stop, wait for the in-flight cycle, and return
    /// its statistics.
    pub async fn stop(mut self) -> RelayStats {
        self.stop_tx.send_replace(true);
        match self.join.take() {
            Some(join) => join.await.unwrap_or_default(),
            None => RelayStats::default(),
        }
    }

    /// Signal the relay to stop without waiting.
    pub fn signal_stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
