//! Application configuration.
//!
//! Every component config has a `Default` and `with_*` builders; `AppConfig`
//! bundles them for the binary, which fills it from CLI flags and
//! `ORDER_EVENTS_*` environment variables.

use std::time::Duration;

use crate::consumer::ConsumerConfig;
use crate::relay::RelayConfig;
use crate::supervisor::SupervisorConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen address.
    pub bind: String,
    /// Upper bound on an order commit; callers may ask for less.
    pub request_timeout: Duration,
    pub relay: RelayConfig,
    pub consumer: ConsumerConfig,
    pub store_supervisor: SupervisorConfig,
    pub broker_supervisor: SupervisorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            request_timeout: Duration::from_secs(5),
            relay: RelayConfig::default(),
            consumer: ConsumerConfig::default(),
            store_supervisor: SupervisorConfig::new("store"),
            broker_supervisor: SupervisorConfig::new("broker"),
        }
    }
}

impl AppConfig {
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_consumer(mut self, consumer: ConsumerConfig) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn with_store_supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.store_supervisor = supervisor;
        self
    }

    pub fn with_broker_supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.broker_supervisor = supervisor;
        self
    }
}
