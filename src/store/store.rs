use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::order::Order;
use crate::outbox::{OutboxEvent, OutboxStatus};

/// Consumer-side dedup ledger entry. Insert-only, unique by `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEventRecord {
    pub event_id: String,
    pub processed_at: DateTime<Utc>,
}

/// A consumer's temporary hold on an event while its side effect runs.
///
/// The claim outlives a failed side effect, expired, so that the failure
/// count carries over to whichever consumer takes the event next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingClaim {
    pub event_id: String,
    pub owner: String,
    pub lease_until: DateTime<Utc>,
    /// Side-effect failures recorded against this event so far.
    #[serde(default)]
    pub failures: u32,
}

/// Result of `ProcessedStore::try_claim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now holds the event and should run the side effect.
    Claimed,
    /// A processed record exists; the side effect already ran.
    AlreadyProcessed,
    /// Someone, possibly another worker of the same consumer, holds an
    /// unexpired claim.
    InFlight,
}

/// Parameters for claiming a batch of due outbox events.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub owner: String,
    pub limit: usize,
    pub lease: Duration,
    pub max_attempts: u32,
    pub now: DateTime<Utc>,
}

impl ClaimRequest {
    pub fn lease_until(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.lease).unwrap_or(chrono::Duration::MAX);
        self.now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Orders collection, written together with the outbox.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Commit the order and its outbox event as one atomic unit.
    async fn insert_order_with_event(
        &self,
        order: &Order,
        event: &OutboxEvent,
    ) -> Result<(), StoreError>;

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError>;
}

/// Outbox collection, drained by the publisher relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `limit` due events in creation order.
    ///
    /// A later event of an aggregate is never returned while an earlier one
    /// is still unpublished.
    async fn claim_due(&self, request: &ClaimRequest) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_published(
        &self,
        event_id: &str,
        owner: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_failed(
        &self,
        event_id: &str,
        owner: &str,
        error: &str,
        attempted_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<OutboxEvent, StoreError>;

    /// Drop a claim without counting an attempt.
    async fn release(&self, event_id: &str, owner: &str) -> Result<(), StoreError>;

    /// Operator retry of a failed event.
    async fn requeue(&self, event_id: &str) -> Result<(), StoreError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<OutboxEvent>, StoreError>;

    async fn events_by_status(&self, status: OutboxStatus) -> Result<Vec<OutboxEvent>, StoreError>;
}

/// Processed-event ledger, written by the idempotent consumer.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    async fn try_claim(
        &self,
        event_id: &str,
        owner: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Insert the processed record and drop the owner's claim in one unit.
    ///
    /// Fails with `StoreError::Duplicate` when a record already exists.
    async fn record_processed(
        &self,
        record: &ProcessedEventRecord,
        owner: &str,
    ) -> Result<(), StoreError>;

    async fn release_claim(&self, event_id: &str, owner: &str) -> Result<(), StoreError>;

    /// Record a failed side effect: expire the owner's claim and bump its
    /// failure count. Returns the new count.
    async fn fail_claim(
        &self,
        event_id: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    async fn get_processed(&self, event_id: &str)
        -> Result<Option<ProcessedEventRecord>, StoreError>;

    async fn processed_count(&self) -> Result<usize, StoreError>;

    /// Delete records processed before `cutoff`, along with claims whose
    /// lease ended before it. Returns how many records were removed.
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
