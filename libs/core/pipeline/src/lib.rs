//! Message Pipeline Framework
//!
//! A transport-agnostic framework for pulling messages from a source and
//! processing them through a composable middleware chain.
//!
//! ## Features
//!
//! - **Message context**: Immutable source payload, mutable destination
//!   payload, typed feature stores, per-message cancellation
//! - **Middleware chain**: Onion-model traversal, registration order on the
//!   way in and reverse order on the way out
//! - **Capabilities**: Complete, delete, postpone, and extend-visibility
//!   actions injected by the source, resolved by type
//! - **Consumer loop**: Fetch, process, and dispatch completion/failure
//!   callbacks; failures never escape a cycle
//! - **Visibility keep-alive**: Background renewal for long-running handlers
//! - **Prometheus metrics**: Built-in observability
//! - **Health endpoints**: K8s-ready liveness and readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use message_pipeline::{Chain, Consumer, ConsumerConfig, MessageSource};
//!
//! // Implement a source for your transport
//! struct MySource { /* ... */ }
//! impl MessageSource for MySource { /* ... */ }
//!
//! // Compose the chain and run
//! let chain = Chain::builder()
//!     .with(MyMiddleware)
//!     .handler(MyHandler);
//! let consumer = Consumer::new(source, chain, ConsumerConfig::new("my-consumer"))
//!     .with_hooks(MyHooks);
//! consumer.run(shutdown_token).await?;
//! ```

mod capabilities;
mod consumer;
mod context;
mod error;
mod features;
mod health;
mod keepalive;
pub mod metrics;
mod middleware;
mod source;

// Re-export main types
pub use capabilities::{CompleteMessage, DeleteMessage, ExtendVisibility, PostponeMessage};
pub use consumer::{
    Consumer, ConsumerConfig, ConsumerHooks, ConsumerState, NoopHooks, RunOutcome,
};
pub use context::MessageContext;
pub use error::{ErrorCategory, PipelineError};
pub use features::FeatureSet;
pub use health::{health_router, HealthState, Heartbeat};
pub use keepalive::VisibilityKeepAlive;
pub use metrics::{init_metrics, PipelineMetrics};
pub use middleware::{Chain, ChainBuilder, Handler, HandlerFn, Middleware, Next};
pub use source::MessageSource;
