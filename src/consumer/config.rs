use std::time::Duration;

use crate::backoff::Backoff;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Claim owner; must be unique per running consumer instance.
    pub consumer_id: String,
    /// Maximum deliveries handled concurrently.
    pub workers: usize,
    /// Side-effect failures after which a message is dead-lettered.
    /// Redeliveries that never reach the side effect do not count.
    pub max_deliveries: u32,
    /// Delay before a delivery that was not processed goes back to the broker.
    pub retry_backoff: Backoff,
    /// How long a processing claim stays exclusive.
    pub claim_lease: Duration,
    pub poll_timeout: Duration,
    /// Age after which processed records are purged.
    pub retention: Duration,
    pub purge_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_id: format!("consumer-{}", std::process::id()),
            workers: 4,
            max_deliveries: 5,
            retry_backoff: Backoff::new(
                Duration::from_millis(100),
                2.0,
                Duration::from_secs(10),
                0.1,
            )
            .unwrap_or_default(),
            claim_lease: Duration::from_secs(30),
            poll_timeout: Duration::from_millis(250),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            purge_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl ConsumerConfig {
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Backoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }
}
