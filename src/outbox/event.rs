use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::{EventEnvelope, EventType};

/// Delivery status of an outbox event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Published,
    Failed,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxStatus::Pending => f.write_str("PENDING"),
            OutboxStatus::Published => f.write_str("PUBLISHED"),
            OutboxStatus::Failed => f.write_str("FAILED"),
        }
    }
}

/// An attempted status change that the outbox lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("outbox event {event_id}: cannot {action} while {from}")]
pub struct TransitionError {
    pub event_id: String,
    pub from: OutboxStatus,
    pub action: &'static str,
}

/// A fact that has been committed but not yet confirmed as delivered.
///
/// Lifecycle: `PENDING → PUBLISHED`, `PENDING → FAILED`, `FAILED → PENDING`.
/// Claims are tracked with `claimed_by`/`lease_until` and never change the
/// status, except that claiming a due `FAILED` event moves it back to
/// `PENDING` for the retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: String,
    /// Id of the order this event describes. Events of the same aggregate
    /// are published in `sequence` order.
    pub aggregate_id: String,
    pub event_type: EventType,
    /// Encoded `EventEnvelope`, snapshotted when the order was created.
    pub payload: Vec<u8>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    /// Assigned by the store on insert; orders events by creation.
    pub sequence: u64,
}

impl OutboxEvent {
    /// Record a pending event for the given envelope.
    pub fn pending(envelope: &EventEnvelope, payload: Vec<u8>) -> Self {
        Self {
            event_id: envelope.event_id.clone(),
            aggregate_id: envelope.payload.id.clone(),
            event_type: envelope.event_type.clone(),
            payload,
            status: OutboxStatus::Pending,
            created_at: envelope.occurred_at,
            last_attempt_at: None,
            next_attempt_at: None,
            attempts: 0,
            last_error: None,
            published_at: None,
            claimed_by: None,
            lease_until: None,
            sequence: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn is_published(&self) -> bool {
        self.status == OutboxStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutboxStatus::Failed
    }

    /// Failed and out of automatic retries; needs an operator.
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.is_failed() && self.attempts >= max_attempts
    }

    /// Held by an unexpired claim.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lease_until, Some(until) if until > now)
    }

    /// Whether a relay may claim this event at `now`.
    pub fn is_due(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        if self.is_leased(now) {
            return false;
        }
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => {
                self.attempts < max_attempts
                    && self.next_attempt_at.map_or(true, |at| at <= now)
            }
            OutboxStatus::Published => false,
        }
    }

    /// Decode the envelope snapshot.
    pub fn envelope(&self) -> Result<EventEnvelope, crate::envelope::EnvelopeError> {
        EventEnvelope::decode(&self.payload)
    }

    fn transition_error(&self, action: &'static str) -> TransitionError {
        TransitionError {
            event_id: self.event_id.clone(),
            from: self.status,
            action,
        }
    }

    pub fn claim(
        &mut self,
        owner: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        match self.status {
            OutboxStatus::Pending => {}
            OutboxStatus::Failed => self.status = OutboxStatus::Pending,
            OutboxStatus::Published => return Err(self.transition_error("claim")),
        }
        self.claimed_by = Some(owner.to_string());
        self.lease_until = Some(lease_until);
        Ok(())
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.is_pending() {
            return Err(self.transition_error("publish"));
        }
        self.status = OutboxStatus::Published;
        self.attempts += 1;
        self.last_attempt_at = Some(at);
        self.published_at = Some(at);
        self.next_attempt_at = None;
        self.last_error = None;
        self.clear_claim();
        Ok(())
    }

    pub fn fail(
        &mut self,
        error: impl Into<String>,
        attempted_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.is_pending() {
            return Err(self.transition_error("fail"));
        }
        self.status = OutboxStatus::Failed;
        self.attempts += 1;
        self.last_attempt_at = Some(attempted_at);
        self.next_attempt_at = Some(next_attempt_at);
        self.last_error = Some(error.into());
        self.clear_claim();
        Ok(())
    }

    /// Give up a claim without counting an attempt.
    pub fn release(&mut self) -> Result<(), TransitionError> {
        if !self.is_pending() {
            return Err(self.transition_error("release"));
        }
        self.clear_claim();
        Ok(())
    }

    /// Operator retry of a failed event. Resets the attempt budget.
    pub fn requeue(&mut self) -> Result<(), TransitionError> {
        if !self.is_failed() {
            return Err(self.transition_error("requeue"));
        }
        self.status = OutboxStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = None;
        self.clear_claim();
        Ok(())
    }

    pub fn is_claimed_by(&self, owner: &str) -> bool {
        self.claimed_by.as_deref() == Some(owner)
    }

    fn clear_claim(&mut self) {
        self.claimed_by = None;
        self.lease_until = None;
    }
}
