//! Shared test utilities for pipeline testing
//!
//! This crate provides reusable test infrastructure for all pipeline crates:
//! - `CallLog`: Shared, ordered recording of labeled calls
//! - `TestDataBuilder`: Deterministic test data generation
//! - `assertions`: Custom assertion helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{CallLog, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_chain_test() {
//!     let log = CallLog::new();
//!     // ... middleware doubles push into the log as they run ...
//!     assert_eq!(log.entries(), vec!["A-before", "H", "A-after"]);
//!
//!     let builder = TestDataBuilder::from_test_name("my_chain_test");
//!     let body = builder.json_event("user.created");
//! }
//! ```

use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Shared, clonable recording of labeled calls in execution order
///
/// Clones share the same underlying log, so a test can hand one clone to each
/// middleware double and read the combined order back at the end.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// All entries joined with a separator, for compact assertions
    pub fn joined(&self, separator: &str) -> String {
        self.entries().join(separator)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all recorded entries
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded random data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// This is the recommended way to create a builder for consistent test data.
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_process_message");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a deterministic message ID for testing
    pub fn message_id(&self) -> Uuid {
        // Use seed to generate deterministic UUID
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Generate a unique name for testing
    ///
    /// # Arguments
    ///
    /// * `prefix` - The type of resource (e.g., "queue", "consumer")
    /// * `suffix` - A unique identifier within the test (e.g., "main", "dlq")
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("my_test");
    /// let name = builder.name("queue", "main");
    /// // Returns: "test-queue-12345-main"
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Generate a deterministic message payload
    pub fn payload(&self, label: &str) -> Vec<u8> {
        format!("payload-{}-{}", self.seed, label).into_bytes()
    }

    /// Generate a deterministic JSON event body
    pub fn json_event(&self, event_type: &str) -> Vec<u8> {
        serde_json::json!({
            "event_type": event_type,
            "payload": {
                "seed": self.seed,
                "message_id": self.message_id().to_string(),
            },
        })
        .to_string()
        .into_bytes()
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that a sequence of log entries appears in order, possibly with
    /// other entries interleaved
    pub fn assert_subsequence(entries: &[String], expected: &[&str], context: &str) {
        let mut remaining = expected.iter();
        let mut looking_for = remaining.next();
        for entry in entries {
            if let Some(want) = looking_for {
                if entry == want {
                    looking_for = remaining.next();
                }
            }
        }
        if let Some(missing) = looking_for {
            panic!(
                "{}: expected to find '{}' (in order {:?}) within {:?}",
                context, missing, expected, entries
            );
        }
    }
}
