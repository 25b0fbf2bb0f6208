//! Per-message processing state and the shared receipt cell

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::transport::ReceiptHandle;

/// Lifecycle of one received message, as decided by capability calls.
///
/// Transitions are monotonic: once a message leaves `Received` it never goes
/// back. `Completed` and `Postponed` are recorded when the corresponding
/// transport call succeeds; `Failed` is recorded by policy code that abandons
/// a message to its visibility timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingState {
    /// Claimed from the queue, no terminal action taken yet
    Received,
    /// Permanently removed from the queue
    Completed,
    /// Abandoned without a queue action; the transport redelivers on expiry
    Failed,
    /// Hidden for a caller-chosen delay, then redeliverable
    Postponed,
}

impl ProcessingState {
    /// Whether the message's fate is settled
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessingState::Received)
    }
}

pub(crate) struct CellInner {
    pub(crate) receipt: ReceiptHandle,
    pub(crate) state: ProcessingState,
}

/// Current receipt and recorded state for one message.
///
/// Capability calls hold the lock across their transport round-trip, so a
/// keep-alive renewal and a terminal action can never interleave on the same
/// message, and the stored receipt is always the latest one issued.
pub(crate) struct HandleCell {
    inner: Mutex<CellInner>,
}

impl HandleCell {
    pub(crate) fn new(receipt: ReceiptHandle) -> Self {
        Self {
            inner: Mutex::new(CellInner {
                receipt,
                state: ProcessingState::Received,
            }),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, CellInner> {
        self.inner.lock().await
    }

    pub(crate) async fn state(&self) -> ProcessingState {
        self.inner.lock().await.state
    }

    pub(crate) async fn mark_failed(&self) -> ProcessingState {
        let mut guard = self.inner.lock().await;
        if !guard.state.is_terminal() {
            guard.state = ProcessingState::Failed;
        }
        guard.state
    }
}

/// Read-side view of a message's processing state.
///
/// The adapter registers one per context as a feature. Hooks read it to skip
/// completion for messages some middleware already settled, and record
/// `Failed` when they abandon a message without any queue action.
#[derive(Clone)]
pub struct ProcessingStateHandle {
    cell: Arc<HandleCell>,
}

impl ProcessingStateHandle {
    pub(crate) fn new(cell: Arc<HandleCell>) -> Self {
        Self { cell }
    }

    /// The state last recorded for this message
    pub async fn state(&self) -> ProcessingState {
        self.cell.state().await
    }

    /// Whether a terminal action has already been recorded
    pub async fn is_settled(&self) -> bool {
        self.state().await.is_terminal()
    }

    /// Record that this message was abandoned without a queue action.
    ///
    /// Keeps any terminal state already recorded; returns the state that
    /// ended up stored.
    pub async fn mark_failed(&self) -> ProcessingState {
        self.cell.mark_failed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> Arc<HandleCell> {
        Arc::new(HandleCell::new(ReceiptHandle::new("m-1", "r-1")))
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ProcessingState::Received.is_terminal());
        assert!(ProcessingState::Completed.is_terminal());
        assert!(ProcessingState::Failed.is_terminal());
        assert!(ProcessingState::Postponed.is_terminal());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ProcessingState::Received.to_string(), "received");
        assert_eq!(ProcessingState::Postponed.to_string(), "postponed");
        let label: &'static str = ProcessingState::Completed.into();
        assert_eq!(label, "completed");
    }

    #[tokio::test]
    async fn test_handle_starts_received() {
        let handle = ProcessingStateHandle::new(cell());
        assert_eq!(handle.state().await, ProcessingState::Received);
        assert!(!handle.is_settled().await);
    }

    #[tokio::test]
    async fn test_mark_failed_settles_a_received_message() {
        let handle = ProcessingStateHandle::new(cell());
        assert_eq!(handle.mark_failed().await, ProcessingState::Failed);
        assert!(handle.is_settled().await);
    }

    #[tokio::test]
    async fn test_mark_failed_never_overwrites_a_terminal_state() {
        let cell = cell();
        {
            let mut guard = cell.lock().await;
            guard.state = ProcessingState::Completed;
        }

        let handle = ProcessingStateHandle::new(cell);
        assert_eq!(handle.mark_failed().await, ProcessingState::Completed);
    }

    #[tokio::test]
    async fn test_clones_share_the_cell() {
        let handle = ProcessingStateHandle::new(cell());
        let clone = handle.clone();

        handle.mark_failed().await;
        assert_eq!(clone.state().await, ProcessingState::Failed);
    }
}
