//! Storage-queue message source
//!
//! Fetch claims messages from the transport, wraps each in a `MessageContext`,
//! and registers the four queue capabilities plus metadata features before
//! returning. Middleware and hooks address the message only through those
//! capabilities; the receipt handle never leaves this module.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_pipeline::{
    CompleteMessage, DeleteMessage, ExtendVisibility, FeatureSet, MessageContext, MessageSource,
    PipelineError, PostponeMessage,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::StorageQueueConfig;
use crate::state::{CellInner, HandleCell, ProcessingState, ProcessingStateHandle};
use crate::transport::{QueueMessage, QueueTransport};

/// Message metadata safe to expose to middleware: identity and delivery
/// history, never the receipt.
#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub message_id: String,
    /// Deliveries so far, this one included
    pub dequeue_count: u32,
    pub inserted_at: DateTime<Utc>,
}

/// Message source backed by a visibility-based storage queue.
///
/// Receives in batches of `prefetch_count`; the first message is returned
/// immediately and the rest are buffered for later fetches. A buffered
/// message's visibility clock started at receive time, so large prefetch
/// counts trade fewer transport calls for shorter remaining windows.
pub struct StorageQueueSource<T> {
    transport: Arc<T>,
    config: StorageQueueConfig,
    buffer: Mutex<VecDeque<QueueMessage>>,
}

impl<T: QueueTransport + 'static> StorageQueueSource<T> {
    pub fn new(transport: T, config: StorageQueueConfig) -> Self {
        Self::from_shared(Arc::new(transport), config)
    }

    /// Build from an already-shared transport, e.g. one an ingress surface
    /// is pushing into
    pub fn from_shared(transport: Arc<T>, config: StorageQueueConfig) -> Self {
        Self {
            transport,
            config,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    fn build_context(&self, message: QueueMessage, cancel: &CancellationToken) -> MessageContext {
        let cell = Arc::new(HandleCell::new(message.handle.clone()));
        let actions = Arc::new(QueueMessageActions {
            transport: self.transport.clone(),
            message_id: message.handle.message_id.clone(),
            cell: cell.clone(),
        });

        let mut features = FeatureSet::new();
        features.insert::<Arc<dyn CompleteMessage>>(actions.clone());
        features.insert::<Arc<dyn DeleteMessage>>(actions.clone());
        features.insert::<Arc<dyn PostponeMessage>>(actions.clone());
        features.insert::<Arc<dyn ExtendVisibility>>(actions);
        features.insert(MessageInfo {
            message_id: message.handle.message_id.clone(),
            dequeue_count: message.dequeue_count,
            inserted_at: message.inserted_at,
        });
        features.insert(ProcessingStateHandle::new(cell));

        MessageContext::new(message.body, features, cancel.child_token())
    }
}

#[async_trait]
impl<T: QueueTransport + 'static> MessageSource for StorageQueueSource<T> {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageContext>, PipelineError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        if let Some(buffered) = self.buffer.lock().await.pop_front() {
            return Ok(Some(self.build_context(buffered, cancel)));
        }

        let received = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            result = self.transport.receive(
                self.config.prefetch_count,
                self.config.visibility_timeout,
            ) => result?,
        };

        let mut messages = received.into_iter();
        let Some(first) = messages.next() else {
            return Ok(None);
        };

        let rest: VecDeque<QueueMessage> = messages.collect();
        if !rest.is_empty() {
            debug!(buffered = rest.len(), "Buffered prefetched messages");
            self.buffer.lock().await.extend(rest);
        }

        Ok(Some(self.build_context(first, cancel)))
    }

    fn name(&self) -> &str {
        "storage-queue"
    }
}

/// The four queue capabilities for one message, sharing a receipt cell.
///
/// Each operation locks the cell across its transport call: the receipt used
/// is always the latest issued, and renewals cannot interleave with terminal
/// actions. Once a terminal state is recorded, every further action is
/// refused locally; receipts lost to another worker are still the
/// transport's to reject.
struct QueueMessageActions<T> {
    transport: Arc<T>,
    message_id: String,
    cell: Arc<HandleCell>,
}

impl<T> QueueMessageActions<T> {
    /// Lock the cell for a queue action, refusing once the message settled.
    ///
    /// The first terminal action wins: one terminal state is never replaced
    /// by another. Anything after it addresses a delivery that already
    /// ended, so callers see the same handle-invalid error as a lost claim.
    async fn lock_actionable(&self) -> Result<MutexGuard<'_, CellInner>, PipelineError> {
        let guard = self.cell.lock().await;
        if guard.state.is_terminal() {
            return Err(PipelineError::handle_invalid(format!(
                "message {} already {}",
                self.message_id, guard.state
            )));
        }
        Ok(guard)
    }
}

#[async_trait]
impl<T: QueueTransport> CompleteMessage for QueueMessageActions<T> {
    async fn complete(&self) -> Result<(), PipelineError> {
        let mut guard = self.lock_actionable().await?;
        self.transport.delete(&guard.receipt).await?;
        guard.state = ProcessingState::Completed;
        debug!(message_id = %self.message_id, "Message completed");
        Ok(())
    }
}

#[async_trait]
impl<T: QueueTransport> DeleteMessage for QueueMessageActions<T> {
    async fn delete(&self) -> Result<(), PipelineError> {
        let mut guard = self.lock_actionable().await?;
        self.transport.delete(&guard.receipt).await?;
        guard.state = ProcessingState::Completed;
        debug!(message_id = %self.message_id, "Message deleted");
        Ok(())
    }
}

#[async_trait]
impl<T: QueueTransport> PostponeMessage for QueueMessageActions<T> {
    async fn postpone(&self, delay: Duration) -> Result<(), PipelineError> {
        let mut guard = self.lock_actionable().await?;
        let rotated = self
            .transport
            .update_visibility(&guard.receipt, delay)
            .await?;
        guard.receipt = rotated;
        guard.state = ProcessingState::Postponed;
        debug!(
            message_id = %self.message_id,
            delay_ms = delay.as_millis() as u64,
            "Message postponed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: QueueTransport> ExtendVisibility for QueueMessageActions<T> {
    async fn extend_visibility(&self, timeout: Duration) -> Result<(), PipelineError> {
        let mut guard = self.lock_actionable().await?;
        let rotated = self
            .transport
            .update_visibility(&guard.receipt, timeout)
            .await?;
        guard.receipt = rotated;
        Ok(())
    }
}
