//! HTTP ingress for the relay queue.
//!
//! Accepts raw event payloads and exposes the queue depth for monitoring.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use bytes::Bytes;
use serde::Serialize;
use storage_queue::MemoryQueue;
use tracing::debug;

/// Receipt returned for an accepted event.
#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub id: String,
    pub status: &'static str,
}

/// Queue depth, counting messages currently hidden by visibility windows.
#[derive(Debug, Serialize)]
pub struct QueueDepthResponse {
    pub depth: usize,
}

pub fn ingress_router(queue: Arc<MemoryQueue>) -> Router {
    Router::new()
        .route("/events", post(enqueue_event))
        .route("/queue/depth", get(queue_depth))
        .with_state(queue)
}

/// Queue a raw event payload for relay.
async fn enqueue_event(
    State(queue): State<Arc<MemoryQueue>>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueuedResponse>), (StatusCode, String)> {
    if body.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Event payload must not be empty".to_string(),
        ));
    }

    let id = queue.push(body).await;
    debug!(message_id = %id, "Event queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            id,
            status: "accepted",
        }),
    ))
}

async fn queue_depth(State(queue): State<Arc<MemoryQueue>>) -> Json<QueueDepthResponse> {
    Json(QueueDepthResponse {
        depth: queue.len().await,
    })
}
