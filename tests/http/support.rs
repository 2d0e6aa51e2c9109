use std::sync::Arc;
use std::time::Duration;

use order_events::http::{self, AppState};
use order_events::store::InMemoryStore;
use order_events::supervisor::{ConnectionSupervisor, SupervisorConfig};
use order_events::{Backoff, OutboxWriter};
use tokio::sync::oneshot;

pub struct TestServer {
    pub base: String,
    pub store: InMemoryStore,
    pub store_supervisor: Arc<ConnectionSupervisor<InMemoryStore>>,
    _shutdown: oneshot::Sender<()>,
}

/// Supervisor that gives up after ~50ms, so degraded states are quick to reach.
pub fn impatient_supervisor(store: &InMemoryStore) -> Arc<ConnectionSupervisor<InMemoryStore>> {
    Arc::new(ConnectionSupervisor::new(
        store.clone(),
        SupervisorConfig::new("store")
            .with_backoff(
                Backoff::new(Duration::from_millis(10), 2.0, Duration::from_millis(20), 0.0)
                    .unwrap(),
            )
            .with_retry_window(Duration::from_millis(50))
            .with_probe_interval(Duration::from_secs(60)),
    ))
}

/// Bind to port 0 and serve until the returned server is dropped.
pub async fn start_server(store: InMemoryStore, request_timeout: Duration) -> TestServer {
    let store_supervisor = impatient_supervisor(&store);
    let writer = OutboxWriter::new(store.clone()).with_supervisor(store_supervisor.clone());
    let state = AppState::new(Arc::new(writer), request_timeout)
        .with_dependency(store_supervisor.clone());
    start_with_state(store, store_supervisor, state).await
}

pub async fn start_with_state(
    store: InMemoryStore,
    store_supervisor: Arc<ConnectionSupervisor<InMemoryStore>>,
    state: AppState<InMemoryStore>,
) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        http::serve_on(listener, state, async {
            let _ = stopped.await;
        })
        .await
        .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        store,
        store_supervisor,
        _shutdown: shutdown,
    }
}
