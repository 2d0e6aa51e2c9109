use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{ConsumeError, ConsumerConfig, Notifier};
use crate::bus::{BrokerError, Delivery, Subscriber};
use crate::envelope::{EventEnvelope, EventType};
use crate::store::{ClaimOutcome, ProcessedEventRecord, ProcessedStore, StoreError};
use crate::supervisor::{ConnectionSupervisor, Connector, Supervisor, SupervisorError};

/// How a delivery should be settled with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Return the message to the broker after `delay`.
    Requeue { delay: Duration },
    DeadLetter { reason: String },
}

enum Processed {
    Handled,
    AlreadyProcessed,
    InFlight,
}

/// Totals over the lifetime of a spawned consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub acked: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub settle_errors: usize,
    pub poll_errors: usize,
    pub purged: usize,
}

impl ConsumerStats {
    fn record(&mut self, disposition: &Disposition, settled: bool) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::Requeue { .. } => self.requeued += 1,
            Disposition::DeadLetter { .. } => self.dead_lettered += 1,
        }
        if !settled {
            self.settle_errors += 1;
        }
    }
}

/// Processes each event at most once per processed record, however many
/// times the broker delivers it.
pub struct IdempotentConsumer<S, N> {
    store: S,
    notifier: N,
    config: ConsumerConfig,
    store_supervisor: Option<Arc<dyn Supervisor>>,
}

impl<S, N> IdempotentConsumer<S, N>
where
    S: ProcessedStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N, config: ConsumerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            store_supervisor: None,
        }
    }

    /// Supervise the processed ledger. A spawned consumer stops polling while
    /// the ledger is unreachable.
    pub fn with_store_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.store_supervisor = Some(supervisor);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    fn store_failed(&self, err: &StoreError) {
        if err.is_unavailable() {
            if let Some(supervisor) = &self.store_supervisor {
                supervisor.report_failure("processed ledger unavailable");
            }
        }
    }

    /// Handle one delivery and decide how to settle it.
    pub async fn on_message(&self, delivery: &Delivery) -> Disposition {
        let retry_after = |attempt: u32| Disposition::Requeue {
            delay: self.config.retry_backoff.delay(attempt.max(1)),
        };
        match self.process(delivery).await {
            Ok(Processed::Handled) | Ok(Processed::AlreadyProcessed) => Disposition::Ack,
            Ok(Processed::InFlight) => retry_after(delivery.attempt),
            Err(err) if err.is_terminal() => {
                error!(
                    message_id = %delivery.message.id,
                    attempt = delivery.attempt,
                    kind = %err.kind(),
                    error = %err,
                    "dead-lettering message"
                );
                Disposition::DeadLetter {
                    reason: format!("{}: {}", err.kind(), err),
                }
            }
            Err(err) => {
                warn!(
                    message_id = %delivery.message.id,
                    attempt = delivery.attempt,
                    error = %err,
                    "message not processed; requeueing"
                );
                match err {
                    ConsumeError::Storage(e) => {
                        self.store_failed(&e);
                        retry_after(delivery.attempt)
                    }
                    ConsumeError::Notify { failures: 0, .. } => retry_after(delivery.attempt),
                    ConsumeError::Notify { failures, .. } => retry_after(failures),
                    _ => retry_after(delivery.attempt),
                }
            }
        }
    }

    async fn process(&self, delivery: &Delivery) -> Result<Processed, ConsumeError> {
        let envelope = EventEnvelope::decode(&delivery.message.payload)?;
        if let EventType::Unknown(name) = &envelope.event_type {
            return Err(ConsumeError::UnknownEventType(name.clone()));
        }

        let event_id = envelope.event_id.as_str();
        let owner = self.config.consumer_id.as_str();
        let now = Utc::now();
        let lease_until = chrono::Duration::from_std(self.config.claim_lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(now);

        match self.store.try_claim(event_id, owner, lease_until, now).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => {
                info!(event_id, attempt = delivery.attempt, "duplicate delivery; already processed");
                return Ok(Processed::AlreadyProcessed);
            }
            ClaimOutcome::InFlight => {
                debug!(event_id, attempt = delivery.attempt, "event in flight");
                return Ok(Processed::InFlight);
            }
        }

        if let Err(source) = self.notifier.notify(&envelope.payload, event_id).await {
            let failures = match self.store.fail_claim(event_id, owner, Utc::now()).await {
                Ok(failures) => failures,
                Err(err) => {
                    // Uncounted failures never poison the message.
                    self.store_failed(&err);
                    warn!(event_id, error = %err, "could not record side-effect failure");
                    return Err(ConsumeError::Notify {
                        event_id: event_id.to_string(),
                        failures: 0,
                        source,
                    });
                }
            };
            if failures >= self.config.max_deliveries {
                return Err(ConsumeError::Poison {
                    event_id: event_id.to_string(),
                    failures,
                    source,
                });
            }
            return Err(ConsumeError::Notify {
                event_id: event_id.to_string(),
                failures,
                source,
            });
        }

        let record = ProcessedEventRecord {
            event_id: event_id.to_string(),
            processed_at: Utc::now(),
        };
        match self.store.record_processed(&record, owner).await {
            Ok(()) => {
                info!(
                    event_id,
                    order_id = %envelope.payload.id,
                    attempt = delivery.attempt,
                    "event processed"
                );
                Ok(Processed::Handled)
            }
            Err(err) if err.is_duplicate() => {
                info!(event_id, "event recorded concurrently by another consumer");
                Ok(Processed::AlreadyProcessed)
            }
            Err(err) => {
                if let Err(release) = self.store.release_claim(event_id, owner).await {
                    debug!(event_id, error = %release, "could not release processing claim");
                }
                Err(err.into())
            }
        }
    }

    /// Delete processed records older than the retention period.
    pub async fn purge_expired(&self) -> Result<usize, ConsumeError> {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Ok(0);
        };
        let purged = self
            .store
            .purge_processed_before(cutoff)
            .await
            .inspect_err(|err| self.store_failed(err))?;
        if purged > 0 {
            info!(purged, "purged expired processed records");
        }
        Ok(purged)
    }

    /// Handle `delivery` and settle it. A requeue delay is cut short when
    /// `stop` fires, so shutdown never waits out a backoff.
    async fn settle<B: Subscriber>(
        &self,
        subscriber: &B,
        delivery: Delivery,
        mut stop: watch::Receiver<bool>,
    ) -> (Disposition, Option<BrokerError>) {
        let disposition = self.on_message(&delivery).await;
        let settled = match &disposition {
            Disposition::Ack => subscriber.ack(delivery.tag).await,
            Disposition::Requeue { delay } => {
                if !*stop.borrow_and_update() {
                    tokio::select! {
                        _ = stop.changed() => {}
                        _ = tokio::time::sleep(*delay) => {}
                    }
                }
                subscriber.nack(delivery.tag, true).await
            }
            Disposition::DeadLetter { reason } => {
                subscriber.dead_letter(delivery.tag, reason).await
            }
        };
        match settled {
            Ok(()) => (disposition, None),
            Err(err) => {
                warn!(
                    message_id = %delivery.message.id,
                    error = %err,
                    "could not settle delivery; broker will redeliver"
                );
                (disposition, Some(err))
            }
        }
    }
}

impl<S, N> IdempotentConsumer<S, N>
where
    S: ProcessedStore + 'static,
    N: Notifier + 'static,
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

    /// Poll `subscriber` on a background task and handle deliveries on a
    /// bounded pool of workers until the handle is stopped.
    ///
    /// Nothing is polled while `supervisor` cannot reach the broker, or the
    /// store supervisor (if any) cannot reach the processed ledger.
    ///
    /// Stopping ends polling and waits for every in-flight delivery to be
    /// settled.
    pub fn spawn<B, C>(
        self,
        subscriber: B,
        supervisor: Arc<ConnectionSupervisor<C>>,
    ) -> ConsumerHandle
    where
        B: Subscriber + 'static,
        C: Connector + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let consumer = Arc::new(self);
        let subscriber = Arc::new(subscriber);

        let join = tokio::spawn(async move {
            let config = consumer.config.clone();
            let permits = Arc::new(Semaphore::new(config.workers.max(1)));
            let mut tasks: JoinSet<(Disposition, Option<BrokerError>)> = JoinSet::new();
            let mut stats = ConsumerStats::default();
            let mut next_purge = Instant::now() + config.purge_interval;
            info!(consumer_id = %config.consumer_id, workers = config.workers, "consumer started");

            loop {
                while let Some(joined) = tasks.try_join_next() {
                    record_settled(&mut stats, joined, &supervisor);
                }
                if *stop_rx.borrow() {
                    break;
                }

                let connected = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    connected = consumer.ready(&supervisor) => connected,
                };
                if connected.is_err() {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        _ = tokio::time::sleep(config.poll_timeout) => continue,
                    }
                }

                if Instant::now() >= next_purge {
                    next_purge = Instant::now() + config.purge_interval;
                    match consumer.purge_expired().await {
                        Ok(purged) => stats.purged += purged,
                        Err(err) => warn!(error = %err, "purge of processed records failed"),
                    }
                }

                let permit = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let polled = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    polled = subscriber.poll(config.poll_timeout) => polled,
                };

                match polled {
                    Ok(Some(delivery)) => {
                        stats.received += 1;
                        let consumer = Arc::clone(&consumer);
                        let subscriber = Arc::clone(&subscriber);
                        let stop = stop_rx.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            consumer.settle(subscriber.as_ref(), delivery, stop).await
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        stats.poll_errors += 1;
                        warn!(error = %err, "poll failed");
                        if err.is_connection() {
                            supervisor.report_failure("poll failed: connection lost");
                        }
                    }
                }
            }

            while let Some(joined) = tasks.join_next().await {
                record_settled(&mut stats, joined, &supervisor);
            }
            info!(
                consumer_id = %config.consumer_id,
                received = stats.received,
                acked = stats.acked,
                dead_lettered = stats.dead_lettered,
                "consumer stopped"
            );
            stats
        });

        ConsumerHandle {
            stop_tx,
            join: Some(join),
        }
    }
}

fn record_settled<C: Connector>(
    stats: &mut ConsumerStats,
    joined: Result<(Disposition, Option<BrokerError>), tokio::task::JoinError>,
    supervisor: &ConnectionSupervisor<C>,
) {
    match joined {
        Ok((disposition, err)) => {
            stats.record(&disposition, err.is_none());
            if err.is_some_and(|e| e.is_connection()) {
                supervisor.report_failure("settle failed: connection lost");
            }
        }
        Err(err) => {
            // The delivery stays unsettled and is redelivered.
            stats.settle_errors += 1;
            error!(error = %err, "delivery handler panicked");
        }
    }
}

/// Handle to a spawned consumer.
pub struct ConsumerHandle {
    stop_tx: watch::Sender<bool>,
    join: Option<JoinHandle<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Stop polling, wait for in-flight deliveries, and return statistics.
    pub async fn stop(mut self) -> ConsumerStats {
        self.stop_tx.send_replace(true);
        match self.join.take() {
            Some(join) => join.await.unwrap_or_default(),
            None => ConsumerStats::default(),
        }
    }

    /// Signal the consumer to stop without waiting.
    pub fn signal_stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
