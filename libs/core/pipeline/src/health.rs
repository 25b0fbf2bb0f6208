//! Health check handlers for pipeline workers.
//!
//! This module provides reusable Axum handlers for:
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`)
//! - Prometheus metrics (`/metrics`)
//!
//! Readiness is driven by a [`Heartbeat`] the consumer loop touches on every
//! cycle: a worker whose loop has stalled past the staleness limit reports
//! not-ready without any transport-specific probe.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::metrics;

/// Last-activity marker shared between a consumer loop and its health probes.
#[derive(Clone, Default)]
pub struct Heartbeat {
    last_activity: Arc<RwLock<Option<Instant>>>,
}

impl Heartbeat {
    /// Create a heartbeat that has never been touched
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity now
    pub fn touch(&self) {
        *self.last_activity.write().unwrap() = Some(Instant::now());
    }

    /// Time since the last recorded activity, if any
    pub fn elapsed(&self) -> Option<Duration> {
        self.last_activity.read().unwrap().map(|at| at.elapsed())
    }

    /// Whether activity was recorded within `limit`.
    ///
    /// A heartbeat that was never touched is not fresh: a worker that has
    /// not completed its first cycle is not ready.
    pub fn is_fresh(&self, limit: Duration) -> bool {
        matches!(self.elapsed(), Some(elapsed) if elapsed <= limit)
    }
}

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Consumer loop heartbeat backing the readiness probe.
    heartbeat: Heartbeat,
    /// How stale the heartbeat may be before the worker reports not-ready.
    staleness_limit: Duration,
}

impl HealthState {
    /// Create a new health state.
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        heartbeat: Heartbeat,
        staleness_limit: Duration,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            heartbeat,
            staleness_limit,
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: &'static str,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler.
///
/// Always returns OK if the server is running.
/// Use this for Kubernetes liveness probes.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler.
///
/// Checks that the consumer loop has completed a cycle recently.
/// Use this for Kubernetes readiness probes.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    match state.heartbeat.elapsed() {
        Some(elapsed) if elapsed <= state.staleness_limit => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": {
                    "consumer": "ok",
                    "last_activity_secs": elapsed.as_secs()
                }
            })),
        )),
        Some(elapsed) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": {
                    "consumer": format!("stalled for {}s", elapsed.as_secs())
                }
            })),
        )),
        None => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": {
                    "consumer": "no activity yet"
                }
            })),
        )),
    }
}

/// Prometheus metrics endpoint handler.
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => {
            let metrics_output = handle.render();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                metrics_output,
            )
                .into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call metrics::init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

/// Create a standard health router.
///
/// This creates an Axum router with standard health endpoints:
/// - `/health` - Liveness probe
/// - `/healthz` - Liveness probe (K8s style)
/// - `/ready` - Readiness probe
/// - `/readyz` - Readiness probe (K8s style)
/// - `/metrics` - Prometheus metrics
pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
