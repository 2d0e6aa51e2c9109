//! In-memory document store for tests and single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ClaimOutcome, ClaimRequest, OrderStore, OutboxStore, ProcessedEventRecord, ProcessedStore,
    ProcessingClaim, StoreError,
};
use crate::order::Order;
use crate::outbox::{OutboxEvent, OutboxStatus};
use crate::supervisor::{ConnectError, Connector};

#[derive(Default)]
struct Collections {
    orders: HashMap<String, Order>,
    outbox: HashMap<String, OutboxEvent>,
    processed: HashMap<String, ProcessedEventRecord>,
    claims: HashMap<String, ProcessingClaim>,
    next_sequence: u64,
}

struct Faults {
    available: bool,
    latency: Duration,
    fail_next_commit: bool,
    fail_next_mark_published: usize,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            available: true,
            latency: Duration::ZERO,
            fail_next_commit: false,
            fail_next_mark_published: 0,
        }
    }
}

/// Document store holding the orders, outbox and processed collections.
///
/// Cloning returns another handle to the same collections. Every operation
/// takes the lock once, applies its change in full, and releases the lock
/// before returning; the lock is never held across an await.
///
/// ## Example
///
/// ```
/// use order_events::store::{InMemoryStore, OrderStore};
///
/// # tokio_test_block(async {
/// let store = InMemoryStore::new();
/// assert!(store.get_order("missing").await.unwrap().is_none());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<Mutex<Collections>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.faults().available = available;
    }

    /// Delay every operation by `latency` before it touches the collections.
    pub fn set_latency(&self, latency: Duration) {
        self.faults().latency = latency;
    }

    /// Make the next order commit die after staging the order row and before
    /// the outbox row, as a process crash would. Nothing becomes visible.
    pub fn fail_next_commit(&self) {
        self.faults().fail_next_commit = true;
    }

    /// Make the next `count` `mark_published` calls fail without applying.
    pub fn fail_next_mark_published(&self, count: usize) {
        self.faults().fail_next_mark_published = count;
    }

    pub fn order_count(&self) -> usize {
        self.lock().map(|c| c.orders.len()).unwrap_or_default()
    }

    pub fn outbox_count(&self) -> usize {
        self.lock().map(|c| c.outbox.len()).unwrap_or_default()
    }

    /// All outbox events in creation order.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        let Ok(collections) = self.lock() else {
            return Vec::new();
        };
        let mut events: Vec<_> = collections.outbox.values().cloned().collect();
        events.sort_by_key(|e| e.sequence);
        events
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Apply configured latency, then fail if the store is unreachable.
    async fn roundtrip(&self) -> Result<(), StoreError> {
        let latency = self.faults().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.faults().available {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

fn outbox_not_found(event_id: &str) -> StoreError {
    StoreError::NotFound {
        collection: "outbox",
        key: event_id.to_string(),
    }
}

fn owned_event<'a>(
    collections: &'a mut Collections,
    event_id: &str,
    owner: &str,
) -> Result<&'a mut OutboxEvent, StoreError> {
    let event = collections
        .outbox
        .get_mut(event_id)
        .ok_or_else(|| outbox_not_found(event_id))?;
    if !event.is_claimed_by(owner) {
        return Err(StoreError::NotOwner {
            event_id: event_id.to_string(),
            owner: owner.to_string(),
        });
    }
    Ok(event)
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order_with_event(
        &self,
        order: &Order,
        event: &OutboxEvent,
    ) -> Result<(), StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;

        if collections.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                collection: "orders",
                key: order.id.clone(),
            });
        }
        if collections.outbox.contains_key(&event.event_id) {
            return Err(StoreError::Duplicate {
                collection: "outbox",
                key: event.event_id.clone(),
            });
        }

        // Stage both rows; nothing is applied until both are ready.
        let staged_order = order.clone();
        let mut staged_event = event.clone();
        staged_event.sequence = collections.next_sequence + 1;

        {
            let mut faults = self.faults();
            if faults.fail_next_commit {
                faults.fail_next_commit = false;
                return Err(StoreError::Unavailable(
                    "transaction aborted before commit".into(),
                ));
            }
        }

        collections.next_sequence = staged_event.sequence;
        collections.orders.insert(staged_order.id.clone(), staged_order);
        collections
            .outbox
            .insert(staged_event.event_id.clone(), staged_event);
        Ok(())
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        self.roundtrip().await?;
        Ok(self.lock()?.orders.get(id).cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn claim_due(&self, request: &ClaimRequest) -> Result<Vec<OutboxEvent>, StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;

        let mut ordered: Vec<(u64, String)> = collections
            .outbox
            .values()
            .filter(|e| !e.is_published())
            .map(|e| (e.sequence, e.event_id.clone()))
            .collect();
        ordered.sort();

        let lease_until = request.lease_until();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut claimed = Vec::new();

        for (_, event_id) in ordered {
            if claimed.len() >= request.limit {
                break;
            }
            let Some(event) = collections.outbox.get_mut(&event_id) else {
                continue;
            };
            if !blocked.insert(event.aggregate_id.clone()) {
                // An earlier event of this aggregate is still unpublished.
                continue;
            }
            if event.is_due(request.now, request.max_attempts) {
                event.claim(&request.owner, lease_until)?;
                claimed.push(event.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_published(
        &self,
        event_id: &str,
        owner: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.roundtrip().await?;
        {
            let mut faults = self.faults();
            if faults.fail_next_mark_published > 0 {
                faults.fail_next_mark_published -= 1;
                return Err(StoreError::Unavailable("write interrupted".into()));
            }
        }

        let mut collections = self.lock()?;
        let event = owned_event(&mut collections, event_id, owner)?;
        event.complete(at)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: &str,
        owner: &str,
        error: &str,
        attempted_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<OutboxEvent, StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        let event = owned_event(&mut collections, event_id, owner)?;
        event.fail(error, attempted_at, next_attempt_at)?;
        Ok(event.clone())
    }

    async fn release(&self, event_id: &str, owner: &str) -> Result<(), StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        let event = owned_event(&mut collections, event_id, owner)?;
        event.release()?;
        Ok(())
    }

    async fn requeue(&self, event_id: &str) -> Result<(), StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        let event = collections
            .outbox
            .get_mut(event_id)
            .ok_or_else(|| outbox_not_found(event_id))?;
        event.requeue()?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<OutboxEvent>, StoreError> {
        self.roundtrip().await?;
        Ok(self.lock()?.outbox.get(event_id).cloned())
    }

    async fn events_by_status(&self, status: OutboxStatus) -> Result<Vec<OutboxEvent>, StoreError> {
        self.roundtrip().await?;
        let collections = self.lock()?;
        let mut events: Vec<_> = collections
            .outbox
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}

#[async_trait]
impl ProcessedStore for InMemoryStore {
    async fn try_claim(
        &self,
        event_id: &str,
        owner: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;

        if collections.processed.contains_key(event_id) {
            return Ok(ClaimOutcome::AlreadyProcessed);
        }
        let failures = match collections.claims.get(event_id) {
            Some(existing) if existing.lease_until > now => return Ok(ClaimOutcome::InFlight),
            Some(expired) => expired.failures,
            None => 0,
        };

        collections.claims.insert(
            event_id.to_string(),
            ProcessingClaim {
                event_id: event_id.to_string(),
                owner: owner.to_string(),
                lease_until,
                failures,
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn record_processed(
        &self,
        record: &ProcessedEventRecord,
        owner: &str,
    ) -> Result<(), StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;

        if collections
            .claims
            .get(&record.event_id)
            .is_some_and(|c| c.owner == owner)
        {
            collections.claims.remove(&record.event_id);
        }
        if collections.processed.contains_key(&record.event_id) {
            return Err(StoreError::Duplicate {
                collection: "processed",
                key: record.event_id.clone(),
            });
        }
        collections
            .processed
            .insert(record.event_id.clone(), record.clone());
        Ok(())
    }

    async fn release_claim(&self, event_id: &str, owner: &str) -> Result<(), StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        if collections
            .claims
            .get(event_id)
            .is_some_and(|c| c.owner == owner)
        {
            collections.claims.remove(event_id);
        }
        Ok(())
    }

    async fn fail_claim(
        &self,
        event_id: &str,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        match collections.claims.get_mut(event_id) {
            Some(claim) if claim.owner == owner => {
                claim.failures += 1;
                claim.lease_until = now;
                Ok(claim.failures)
            }
            _ => Err(StoreError::NotOwner {
                event_id: event_id.to_string(),
                owner: owner.to_string(),
            }),
        }
    }

    async fn get_processed(
        &self,
        event_id: &str,
    ) -> Result<Option<ProcessedEventRecord>, StoreError> {
        self.roundtrip().await?;
        Ok(self.lock()?.processed.get(event_id).cloned())
    }

    async fn processed_count(&self) -> Result<usize, StoreError> {
        self.roundtrip().await?;
        Ok(self.lock()?.processed.len())
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.roundtrip().await?;
        let mut collections = self.lock()?;
        let before = collections.processed.len();
        collections.processed.retain(|_, r| r.processed_at >= cutoff);
        collections.claims.retain(|_, c| c.lease_until >= cutoff);
        Ok(before - collections.processed.len())
    }
}

#[async_trait]
impl Connector for InMemoryStore {
    async fn probe(&self) -> Result<(), ConnectError> {
        if self.faults().available {
            Ok(())
        } else {
            Err(ConnectError::new("store", "connection refused"))
        }
    }
}
