//! Capability contracts for transport-specific message actions
//!
//! A message source registers implementations of these traits into a
//! context's source-feature store (as `Arc<dyn …>`) before returning from
//! fetch. Middleware and callbacks resolve them by type; the transport handle
//! behind each capability never leaves the source adapter.
//!
//! Lookup of an unregistered capability returns `None`. The `require_*`
//! accessors turn absence into [`PipelineError::CapabilityNotConfigured`] for
//! callers that cannot proceed without one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::context::MessageContext;
use crate::error::PipelineError;

/// Acknowledge a message with its source so it is never redelivered.
#[async_trait]
pub trait CompleteMessage: Send + Sync {
    async fn complete(&self) -> Result<(), PipelineError>;
}

/// Permanently remove a message from its source.
#[async_trait]
pub trait DeleteMessage: Send + Sync {
    async fn delete(&self) -> Result<(), PipelineError>;
}

/// Hide a message for `delay`, after which it becomes redeliverable.
#[async_trait]
pub trait PostponeMessage: Send + Sync {
    async fn postpone(&self, delay: Duration) -> Result<(), PipelineError>;
}

/// Push a message's redelivery horizon out to `timeout` from now.
#[async_trait]
pub trait ExtendVisibility: Send + Sync {
    async fn extend_visibility(&self, timeout: Duration) -> Result<(), PipelineError>;
}

impl MessageContext {
    /// The completion capability, if the source registered one
    pub fn completion(&self) -> Option<Arc<dyn CompleteMessage>> {
        self.source_features().get::<Arc<dyn CompleteMessage>>().cloned()
    }

    /// The deletion capability, if the source registered one
    pub fn deletion(&self) -> Option<Arc<dyn DeleteMessage>> {
        self.source_features().get::<Arc<dyn DeleteMessage>>().cloned()
    }

    /// The postponement capability, if the source registered one
    pub fn postponement(&self) -> Option<Arc<dyn PostponeMessage>> {
        self.source_features().get::<Arc<dyn PostponeMessage>>().cloned()
    }

    /// The visibility-extension capability, if the source registered one
    pub fn visibility_extension(&self) -> Option<Arc<dyn ExtendVisibility>> {
        self.source_features().get::<Arc<dyn ExtendVisibility>>().cloned()
    }

    /// The completion capability, or a configuration error naming it
    pub fn require_completion(&self) -> Result<Arc<dyn CompleteMessage>, PipelineError> {
        self.completion()
            .ok_or(PipelineError::CapabilityNotConfigured("completion"))
    }

    /// The deletion capability, or a configuration error naming it
    pub fn require_deletion(&self) -> Result<Arc<dyn DeleteMessage>, PipelineError> {
        self.deletion()
            .ok_or(PipelineError::CapabilityNotConfigured("deletion"))
    }

    /// The postponement capability, or a configuration error naming it
    pub fn require_postponement(&self) -> Result<Arc<dyn PostponeMessage>, PipelineError> {
        self.postponement()
            .ok_or(PipelineError::CapabilityNotConfigured("postponement"))
    }

    /// The visibility-extension capability, or a configuration error naming it
    pub fn require_visibility_extension(&self) -> Result<Arc<dyn ExtendVisibility>, PipelineError> {
        self.visibility_extension()
            .ok_or(PipelineError::CapabilityNotConfigured("visibility-extension"))
    }

    /// Terminal completion: invoke the registered completion capability, or
    /// do nothing when the source registered none.
    ///
    /// This is the transport-specific extension point. A queue-backed source
    /// registers a capability that deletes the message; a source with nothing
    /// to acknowledge registers none and this call is a no-op.
    pub async fn mark_complete(&self) -> Result<(), PipelineError> {
        match self.completion() {
            Some(completion) => completion.complete().await,
            None => {
                debug!("No completion capability registered; mark_complete is a no-op");
                Ok(())
            }
        }
    }
}
