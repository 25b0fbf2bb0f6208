//! Queue transport contract
//!
//! The adapter talks to the queue service through this narrow interface.
//! Everything transport-specific (connections, retries, wire encoding) lives
//! behind it; the adapter only needs receive, delete, and visibility updates.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use message_pipeline::PipelineError;

/// Claim on one received message: stable id plus the current pop receipt.
///
/// Every successful visibility update re-issues the receipt; the queue honors
/// only the latest one. Holding a stale receipt means the claim is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    pub message_id: String,
    pub pop_receipt: String,
}

impl ReceiptHandle {
    pub fn new(message_id: impl Into<String>, pop_receipt: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            pop_receipt: pop_receipt.into(),
        }
    }
}

/// One message as delivered by the transport
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub handle: ReceiptHandle,
    pub body: Bytes,
    /// How many times this message has been delivered, this delivery included
    pub dequeue_count: u32,
    pub inserted_at: DateTime<Utc>,
}

/// Interface to a visibility-based queue service.
///
/// Implementations can target different backends (a cloud storage queue, the
/// in-memory queue used in tests). All three operations suspend on I/O and
/// report stale receipts as [`PipelineError::HandleInvalid`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `max_count` messages, hiding each from other consumers
    /// for `visibility_timeout`
    async fn receive(
        &self,
        max_count: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, PipelineError>;

    /// Permanently remove a message addressed by its current receipt
    async fn delete(&self, handle: &ReceiptHandle) -> Result<(), PipelineError>;

    /// Replace a message's visibility timeout, re-issuing its receipt
    async fn update_visibility(
        &self,
        handle: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<ReceiptHandle, PipelineError>;
}
