//! Storage Queue Source Adapter
//!
//! Implements the pipeline's `MessageSource` over a visibility-based queue
//! transport and injects the queue's capabilities into each message context.
//!
//! ## Features
//!
//! - **Capability injection**: Complete, delete, postpone, and
//!   extend-visibility registered per message; the receipt never escapes
//! - **Receipt rotation**: Visibility updates re-issue the pop receipt and
//!   the adapter always addresses the transport with the latest one
//! - **Processing state**: Per-message `Received -> Completed/Failed/Postponed`
//!   record for completion and retry policy
//! - **Prefetch**: Batched receive with local buffering
//! - **In-memory transport**: Full visibility semantics for tests and
//!   single-process deployments
//!
//! ## Example
//!
//! ```ignore
//! use storage_queue::{MemoryQueue, StorageQueueConfig, StorageQueueSource};
//!
//! let queue = Arc::new(MemoryQueue::new());
//! queue.push(b"hello".as_slice()).await;
//!
//! let source = StorageQueueSource::from_shared(
//!     queue.clone(),
//!     StorageQueueConfig::new().with_visibility_timeout(Duration::from_secs(30)),
//! );
//! let consumer = Consumer::new(source, chain, config);
//! ```

mod config;
mod memory;
mod source;
mod state;
mod transport;

// Re-export main types
pub use config::StorageQueueConfig;
pub use memory::MemoryQueue;
pub use source::{MessageInfo, StorageQueueSource};
pub use state::{ProcessingState, ProcessingStateHandle};
pub use transport::{QueueMessage, QueueTransport, ReceiptHandle};
