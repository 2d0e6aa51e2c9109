use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use order_events::bus::InMemoryBroker;
use order_events::consumer::{ConsumerConfig, IdempotentConsumer, LogNotifier};
use order_events::http::{self, AppState};
use order_events::relay::{PublisherRelay, RelayConfig};
use order_events::store::InMemoryStore;
use order_events::supervisor::ConnectionSupervisor;
use order_events::{AppConfig, OutboxWriter, ORDER_CREATED_TOPIC};

#[derive(Parser)]
#[command(
    name = "order-events",
    about = "Order intake, outbox relay and notification consumer in one process"
)]
struct Cli {
    /// HTTP listen address
    #[arg(long, env = "ORDER_EVENTS_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Upper bound on an order commit, in milliseconds
    #[arg(long, env = "ORDER_EVENTS_REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    request_timeout_ms: u64,

    /// Outbox events claimed per drain cycle
    #[arg(long, env = "ORDER_EVENTS_BATCH_SIZE", default_value_t = 50)]
    batch_size: usize,

    /// Pause between idle drain cycles, in milliseconds
    #[arg(long, env = "ORDER_EVENTS_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    /// Publish attempts before an event is left for an operator
    #[arg(long, env = "ORDER_EVENTS_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    /// Deliveries before a failing message is dead-lettered
    #[arg(long, env = "ORDER_EVENTS_MAX_DELIVERIES", default_value_t = 5)]
    max_deliveries: u32,

    /// Concurrent consumer workers
    #[arg(long, env = "ORDER_EVENTS_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Hours to keep processed-event records
    #[arg(long, env = "ORDER_EVENTS_RETENTION_HOURS", default_value_t = 168)]
    retention_hours: u64,

    /// Seconds to keep reconnecting before a dependency is degraded
    #[arg(long, env = "ORDER_EVENTS_RETRY_WINDOW_SECS", default_value_t = 120)]
    retry_window_secs: u64,
}

impl Cli {
    fn into_config(self) -> AppConfig {
        let defaults = AppConfig::default();
        let retry_window = Duration::from_secs(self.retry_window_secs);

        AppConfig::default()
            .with_bind(self.bind)
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_relay(
                RelayConfig::default()
                    .with_batch_size(self.batch_size)
                    .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
                    .with_max_attempts(self.max_attempts),
            )
            .with_consumer(
                ConsumerConfig::default()
                    .with_workers(self.workers)
                    .with_max_deliveries(self.max_deliveries)
                    .with_retention(Duration::from_secs(self.retention_hours * 3600)),
            )
            .with_store_supervisor(defaults.store_supervisor.with_retry_window(retry_window))
            .with_broker_supervisor(defaults.broker_supervisor.with_retry_window(retry_window))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c; shutting down");
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Cli::parse().into_config();
    info!(bind = %config.bind, "starting order-events");

    let store = InMemoryStore::new();
    let broker = InMemoryBroker::new();

    let store_supervisor = Arc::new(ConnectionSupervisor::new(
        store.clone(),
        config.store_supervisor.clone(),
    ));
    let broker_supervisor = Arc::new(ConnectionSupervisor::new(
        broker.clone(),
        config.broker_supervisor.clone(),
    ));
    store_supervisor
        .ensure_connected()
        .await
        .context("store unreachable at startup")?;

    let relay = PublisherRelay::new(store.clone(), broker.clone(), config.relay.clone())
        .with_store_supervisor(store_supervisor.clone())
        .spawn(broker_supervisor.clone());
    let consumer = IdempotentConsumer::new(store.clone(), LogNotifier::new(), config.consumer.clone())
        .with_store_supervisor(store_supervisor.clone())
        .spawn(broker.subscribe(ORDER_CREATED_TOPIC), broker_supervisor.clone());

    let writer = OutboxWriter::new(store.clone()).with_supervisor(store_supervisor.clone());
    let state = AppState::new(Arc::new(writer), config.request_timeout)
        .with_dependency(store_supervisor.clone())
        .with_dependency(broker_supervisor.clone());

    let served = http::serve(state, &config.bind, shutdown_signal())
        .await
        .with_context(|| format!("http server on {}", config.bind));

    let relay_stats = relay.stop().await;
    let consumer_stats = consumer.stop().await;
    info!(
        published = relay_stats.published,
        failed = relay_stats.failed,
        processed = consumer_stats.acked,
        dead_lettered = consumer_stats.dead_lettered,
        "stopped"
    );

    served
}
