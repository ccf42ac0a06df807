//! HTTP transport: snapshot fetch, live feed, probes and metrics

use crate::error::ApiError;
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use mirror_lib::{
    health::{components, HealthRegistry, ReadinessResponse},
    ClusterMirror, ComponentStatus, MirrorError, StructuredLogger,
};
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub mirror: ClusterMirror,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(
        mirror: ClusterMirror,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
        static_dir: PathBuf,
    ) -> Self {
        Self {
            mirror,
            health_registry,
            logger,
            static_dir,
        }
    }

    /// Readiness from the last delivery, mirrored into broadcaster health
    async fn readiness(&self) -> ReadinessResponse {
        let readiness = self
            .health_registry
            .readiness(self.mirror.last_delivery());

        match &readiness.reason {
            None => {
                self.health_registry
                    .set_healthy(components::BROADCASTER)
                    .await
            }
            Some(reason) => {
                self.health_registry
                    .set_degraded(components::BROADCASTER, reason.clone())
                    .await
            }
        }
        readiness
    }
}

/// Liveness: the process is up
async fn alive() -> &'static str {
    "OK"
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.readiness().await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Current snapshot as JSON
async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(&state.mirror.snapshot()).map_err(MirrorError::from)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Logs the end of a live feed when the response stream is dropped
struct FeedGuard {
    id: u64,
    mirror: ClusterMirror,
    logger: StructuredLogger,
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.logger
            .log_subscriber_disconnected(self.id, self.mirror.subscriber_count());
    }
}

/// Live feed: the current snapshot, then every published snapshot tagged
/// `update-<n>` with n counting from 1 on this connection
async fn stream(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before copying so no delivery falls in between
    let subscription = state.mirror.subscribe();
    let initial = serde_json::to_string(&state.mirror.snapshot()).map_err(MirrorError::from)?;

    let guard = FeedGuard {
        id: subscription.id(),
        mirror: state.mirror.clone(),
        logger: state.logger.clone(),
    };
    state
        .logger
        .log_subscriber_connected(guard.id, state.mirror.subscriber_count());

    let mut sequence = 0u64;
    let updates = subscription.filter_map(move |snapshot| {
        let guard = &guard;
        match serde_json::to_string(&*snapshot) {
            Ok(data) => {
                sequence += 1;
                Some(Ok(Event::default()
                    .id(format!("update-{}", sequence))
                    .data(data)))
            }
            Err(e) => {
                warn!(subscriber_id = guard.id, error = %e, "Skipping unserializable snapshot");
                None
            }
        }
    });

    let first = tokio_stream::once(Ok(Event::default().data(initial)));
    Ok(Sse::new(first.chain(updates)).keep_alive(KeepAlive::default()))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    let assets = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/api/alive", get(alive))
        .route("/api/ready", get(ready))
        .route("/api/health", get(health))
        .route(
            "/api/snapshot",
            get(snapshot).layer(CompressionLayer::new()),
        )
        .route("/api/stream", get(stream))
        .route("/metrics", get(metrics))
        .fallback_service(assets)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server, stopping once `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
