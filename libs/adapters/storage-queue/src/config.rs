//! Source adapter configuration

use std::time::Duration;

/// Configuration for a storage-queue source
#[derive(Debug, Clone)]
pub struct StorageQueueConfig {
    /// How long each received message stays hidden from other consumers
    pub visibility_timeout: Duration,

    /// How many messages to request per receive call; extras are buffered
    /// and handed out by later fetches
    pub prefetch_count: usize,
}

impl StorageQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-message visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set the receive batch size (minimum 1)
    pub fn with_prefetch_count(mut self, count: usize) -> Self {
        self.prefetch_count = count.max(1);
        self
    }
}

impl Default for StorageQueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            prefetch_count: 1,
        }
    }
}
