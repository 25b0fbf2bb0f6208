//! In-memory queue transport with visibility-timeout semantics
//!
//! Behaves like a real storage queue: receive hides a message and rotates
//! its pop receipt, delete and visibility updates honor only the latest
//! receipt, and an expired window makes the message receivable again.
//! Backs tests and single-process deployments where the ingress pushes
//! straight into the consumer's queue.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use message_pipeline::PipelineError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::transport::{QueueMessage, QueueTransport, ReceiptHandle};

struct StoredMessage {
    id: String,
    body: Bytes,
    inserted_at: DateTime<Utc>,
    visible_at: Instant,
    pop_receipt: String,
    dequeue_count: u32,
}

/// In-memory visibility-based queue
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message, immediately visible; returns its id
    pub async fn push(&self, body: impl Into<Bytes>) -> String {
        let id = Uuid::new_v4().to_string();
        let mut messages = self.messages.lock().await;
        messages.push(StoredMessage {
            id: id.clone(),
            body: body.into(),
            inserted_at: Utc::now(),
            visible_at: Instant::now(),
            pop_receipt: Uuid::new_v4().to_string(),
            dequeue_count: 0,
        });
        id
    }

    /// Total depth, counting currently invisible messages
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn receive(
        &self,
        max_count: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, PipelineError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().await;

        let mut received = Vec::new();
        for stored in messages.iter_mut() {
            if received.len() >= max_count {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            stored.dequeue_count += 1;
            stored.pop_receipt = Uuid::new_v4().to_string();
            stored.visible_at = now + visibility_timeout;
            received.push(QueueMessage {
                handle: ReceiptHandle::new(stored.id.clone(), stored.pop_receipt.clone()),
                body: stored.body.clone(),
                dequeue_count: stored.dequeue_count,
                inserted_at: stored.inserted_at,
            });
        }

        Ok(received)
    }

    async fn delete(&self, handle: &ReceiptHandle) -> Result<(), PipelineError> {
        let mut messages = self.messages.lock().await;
        let position = messages
            .iter()
            .position(|s| s.id == handle.message_id && s.pop_receipt == handle.pop_receipt);

        match position {
            Some(index) => {
                messages.remove(index);
                Ok(())
            }
            None => Err(PipelineError::handle_invalid(format!(
                "message {} receipt expired or superseded",
                handle.message_id
            ))),
        }
    }

    async fn update_visibility(
        &self,
        handle: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<ReceiptHandle, PipelineError> {
        let mut messages = self.messages.lock().await;
        let stored = messages
            .iter_mut()
            .find(|s| s.id == handle.message_id && s.pop_receipt == handle.pop_receipt);

        match stored {
            Some(stored) => {
                stored.pop_receipt = Uuid::new_v4().to_string();
                stored.visible_at = Instant::now() + visibility_timeout;
                Ok(ReceiptHandle::new(
                    stored.id.clone(),
                    stored.pop_receipt.clone(),
                ))
            }
            None => Err(PipelineError::handle_invalid(format!(
                "message {} receipt expired or superseded",
                handle.message_id
            ))),
        }
    }
}
