use std::time::Duration;

use crate::backoff::Backoff;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Claim owner; must be unique per running relay.
    pub relay_id: String,
    /// Maximum events claimed per drain cycle.
    pub batch_size: usize,
    /// Pause between drain cycles when the outbox is idle.
    pub poll_interval: Duration,
    /// How long a claim stays exclusive before another relay may take over.
    pub lease: Duration,
    /// Failed attempts after which an event is left for an operator.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_id: format!("relay-{}", std::process::id()),
            batch_size: 50,
            poll_interval: Duration::from_millis(500),
            lease: Duration::from_secs(30),
            max_attempts: 10,
            backoff: Backoff::default(),
        }
    }
}

impl RelayConfig {
    pub fn with_relay_id(mut self, id: impl Into<String>) -> Self {
        self.relay_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}
