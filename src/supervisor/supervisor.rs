use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{Connector, SupervisorError};
use crate::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one dependency for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub state: ConnectionState,
}

impl HealthStatus {
    pub fn is_degraded(&self) -> bool {
        self.state == ConnectionState::Degraded
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Dependency name used in logs and health output.
    pub name: String,
    pub backoff: Backoff,
    /// How long to keep reconnecting before declaring the dependency degraded.
    pub retry_window: Duration,
    /// Minimum spacing of half-open probes while degraded.
    pub probe_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            name: "dependency".into(),
            backoff: Backoff::default(),
            retry_window: Duration::from_secs(120),
            probe_interval: Duration::from_secs(30),
        }
    }
}

impl SupervisorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }
}

/// Anything that can report the health of a dependency.
pub trait HealthCheck: Send + Sync {
    fn health(&self) -> HealthStatus;
}

/// A supervised dependency as seen by the components that use it.
///
/// Lets a component hold a supervisor without naming its connector type.
#[async_trait]
pub trait Supervisor: HealthCheck {
    async fn ensure_connected(&self) -> Result<(), SupervisorError>;

    fn report_failure(&self, reason: &str);
}

#[derive(Default)]
struct Reconnect {
    last_probe: Option<Instant>,
    /// Start of the current outage. Kept across cancelled reconnect loops so
    /// the retry window is measured from the first failed probe.
    down_since: Option<Instant>,
}

/// Owns the connection lifecycle of one external dependency.
///
/// ## Example
///
/// ```ignore
/// let broker_supervisor = Arc::new(ConnectionSupervisor::new(
///     broker.clone(),
///     SupervisorConfig::new("broker"),
/// ));
///
/// // Before each unit of work
/// broker_supervisor.ensure_connected().await?;
///
/// // After an operation fails because the connection is gone
/// broker_supervisor.report_failure("publish: connection closed");
/// ```
pub struct ConnectionSupervisor<C> {
    connector: C,
    config: SupervisorConfig,
    state: watch::Sender<ConnectionState>,
    /// Serializes reconnect loops and probes.
    reconnect: Mutex<Reconnect>,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(connector: C, config: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            config,
            state,
            reconnect: Mutex::new(Reconnect::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            name: self.config.name.clone(),
            state: self.state(),
        }
    }

    /// Return once connected, reconnecting if needed.
    ///
    /// Fails with `SupervisorError::Degraded` when the retry window elapses
    /// without a successful probe, or immediately while degraded unless a
    /// half-open probe is due.
    pub async fn ensure_connected(&self) -> Result<(), SupervisorError> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let mut reconnect = self.reconnect.lock().await;
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Degraded => self.half_open_probe(&mut reconnect).await,
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                self.reconnect_loop(&mut reconnect).await
            }
        }
    }

    /// Record that an operation failed because the connection is gone.
    pub fn report_failure(&self, reason: &str) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if changed {
            warn!(dependency = %self.config.name, reason, state = "disconnected", "connection lost");
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn degraded(&self) -> SupervisorError {
        SupervisorError::Degraded {
            name: self.config.name.clone(),
        }
    }

    async fn reconnect_loop(&self, reconnect: &mut Reconnect) -> Result<(), SupervisorError> {
        self.set_state(ConnectionState::Connecting);
        let started = *reconnect.down_since.get_or_insert_with(Instant::now);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.connector.probe().await {
                Ok(()) => {
                    reconnect.down_since = None;
                    self.set_state(ConnectionState::Connected);
                    info!(dependency = %self.config.name, attempt, state = "connected", "connected");
                    return Ok(());
                }
                Err(err) => {
                    let delay = self.config.backoff.delay(attempt);
                    if started.elapsed() + delay > self.config.retry_window {
                        self.set_state(ConnectionState::Degraded);
                        reconnect.down_since = None;
                        reconnect.last_probe = Some(Instant::now());
                        error!(
                            dependency = %self.config.name,
                            attempt,
                            error = %err,
                            state = "degraded",
                            "retry window elapsed; dependency degraded"
                        );
                        return Err(self.degraded());
                    }
                    warn!(
                        dependency = %self.config.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connect failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn half_open_probe(&self, reconnect: &mut Reconnect) -> Result<(), SupervisorError> {
        let due = reconnect
            .last_probe
            .map_or(true, |at| at.elapsed() >= self.config.probe_interval);
        if !due {
            return Err(self.degraded());
        }

        reconnect.last_probe = Some(Instant::now());
        match self.connector.probe().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!(dependency = %self.config.name, state = "connected", "dependency recovered");
                Ok(())
            }
            Err(err) => {
                warn!(dependency = %self.config.name, error = %err, state = "degraded", "probe failed");
                Err(self.degraded())
            }
        }
    }
}

impl<C: Connector> HealthCheck for ConnectionSupervisor<C> {
    fn health(&self) -> HealthStatus {
        ConnectionSupervisor::health(self)
    }
}

#[async_trait]
impl<C: Connector> Supervisor for ConnectionSupervisor<C> {
    async fn ensure_connected(&self) -> Result<(), SupervisorError> {
        ConnectionSupervisor::ensure_connected(self).await
    }

    fn report_failure(&self, reason: &str) {
        ConnectionSupervisor::report_failure(self, reason)
    }
}
