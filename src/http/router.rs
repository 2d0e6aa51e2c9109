use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use super::ApiError;
use crate::order::{CreateOrder, Order};
use crate::outbox::OutboxWriter;
use crate::store::OrderStore;
use crate::supervisor::{HealthCheck, HealthStatus, SupervisorError};

/// Header carrying the caller's deadline in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Shared state of the HTTP handlers.
pub struct AppState<S> {
    pub writer: Arc<OutboxWriter<S>>,
    /// Supervisors of every external dependency, reported by `/health`.
    /// Order intake is refused while any of them is degraded.
    pub dependencies: Vec<Arc<dyn HealthCheck>>,
    /// Upper bound on how long an order commit may take.
    pub request_timeout: Duration,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            dependencies: self.dependencies.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: OrderStore + 'static> AppState<S> {
    pub fn new(writer: Arc<OutboxWriter<S>>, request_timeout: Duration) -> Self {
        Self {
            writer,
            dependencies: Vec::new(),
            request_timeout,
        }
    }

    pub fn with_dependency(mut self, dependency: Arc<dyn HealthCheck>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    fn health(&self) -> Vec<HealthStatus> {
        self.dependencies.iter().map(|d| d.health()).collect()
    }

    /// Deadline for one request: the caller's, capped by ours.
    fn deadline(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(REQUEST_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .map_or(self.request_timeout, |requested| {
                requested.min(self.request_timeout)
            })
    }
}

/// Build an axum `Router` for order intake and health.
pub fn router<S: OrderStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/orders", post(create_order_handler::<S>))
        .route("/order", post(create_order_handler::<S>))
        .with_state(state)
}

/// Serve at `addr` (e.g. `"0.0.0.0:8080"`) until `shutdown` resolves.
pub async fn serve<S, F>(state: AppState<S>, addr: &str, shutdown: F) -> Result<(), std::io::Error>
where
    S: OrderStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_on<S, F>(
    listener: TcpListener,
    state: AppState<S>,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    S: OrderStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// `GET /health`
async fn health_handler<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let dependencies = state.health();
    let degraded = dependencies.iter().any(HealthStatus::is_degraded);
    let (status, label) = if degraded {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    (
        status,
        Json(json!({ "status": label, "dependencies": dependencies })),
    )
}

/// `POST /orders`
async fn create_order_handler<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    if let Some(degraded) = state.health().into_iter().find(HealthStatus::is_degraded) {
        return Err(SupervisorError::Degraded {
            name: degraded.name,
        }
        .into());
    }

    let Json(request) = body?;
    let order = state
        .writer
        .create_order_within(request, state.deadline(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}
