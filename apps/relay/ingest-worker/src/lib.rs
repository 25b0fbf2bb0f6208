//! Relay Ingest Worker
//!
//! Accepts raw events over HTTP, queues them with visibility-based delivery,
//! and relays each one through the message pipeline.
//!
//! ## Architecture
//!
//! ```text
//! POST /events
//!   ↓ (raw payload)
//! MemoryQueue (visibility-based storage queue)
//!   ↓ (StorageQueueSource wires completion/postpone/delete capabilities)
//! Consumer loop
//!   ↓ ValidateEvent → VisibilityKeepAlive → NormalizeEvent
//! RelayHooks (acknowledge, postpone with backoff, or drop)
//! ```
//!
//! ## Features
//!
//! - HTTP ingress with queue depth introspection
//! - Poison-message discard in the validation guard
//! - Exponential retry with a bounded delivery budget
//! - Visibility keep-alive for slow handlers
//! - Graceful shutdown handling
//! - Health check endpoints for Kubernetes probes

pub mod config;
pub mod http;
pub mod pipeline;

use std::sync::Arc;

use core_config::{Environment, FromEnv, app_info};
use eyre::{Result, WrapErr};
use message_pipeline::{
    Consumer, ConsumerConfig, HealthState, VisibilityKeepAlive, health_router, metrics,
};
use storage_queue::{MemoryQueue, StorageQueueConfig, StorageQueueSource};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Settings;
use crate::pipeline::RelayHooks;

/// Run the relay ingest worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Starts the ingress and health HTTP server
/// 3. Runs the consumer loop until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if:
/// - Worker configuration is invalid
/// - The HTTP listener cannot bind
/// - The consumer loop hits a fatal fetch error
pub async fn run() -> Result<()> {
    // Initialize tracing (env-aware: JSON for prod, pretty for dev)
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    // Initialize Prometheus metrics
    metrics::init_metrics();

    // App info for health endpoint
    let app_info = app_info!();

    info!(name = %app_info.name, version = %app_info.version, "Starting relay ingest worker");
    info!("Environment: {:?}", environment);

    let settings = Settings::from_env().wrap_err("Failed to load worker configuration")?;
    info!(
        visibility_timeout_secs = %settings.visibility_timeout.as_secs(),
        prefetch_count = %settings.prefetch_count,
        max_attempts = %settings.max_attempts,
        "Worker configuration loaded"
    );

    // The queue is shared between the HTTP ingress (producer side) and the
    // consumer loop (source side).
    let queue = Arc::new(MemoryQueue::new());
    let source = StorageQueueSource::from_shared(
        queue.clone(),
        StorageQueueConfig::new()
            .with_visibility_timeout(settings.visibility_timeout)
            .with_prefetch_count(settings.prefetch_count),
    );

    let chain = pipeline::build_chain(
        VisibilityKeepAlive::with_extension(settings.keepalive_extension)
            .for_consumer("relay-ingest"),
    );
    let consumer = Consumer::new(
        source,
        chain,
        ConsumerConfig::new("relay-ingest").with_idle_delay(settings.idle_delay),
    )
    .with_hooks(RelayHooks::new(settings.max_attempts, settings.retry_delay));

    // Set up a shutdown signal
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        signal_cancel.cancel();
    });

    // Ingress, health and metrics endpoints share one server
    let health_state = HealthState::new(
        app_info.name,
        app_info.version,
        consumer.heartbeat(),
        settings.heartbeat_staleness,
    );
    let app = http::ingress_router(queue.clone())
        .merge(health_router(health_state))
        .layer(TraceLayer::new_for_http());

    let address = settings.http.address();
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", address))?;
    info!(address = %address, "HTTP server listening");

    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "HTTP server failed");
        }
    });

    // Run the consumer loop until the shutdown signal fires
    info!("Starting relay consumer...");
    consumer.run(cancel).await?;

    info!("Relay ingest worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
