//! Per-message processing context
//!
//! A [`MessageContext`] identifies one in-flight message: the immutable bytes
//! it arrived with, the mutable bytes middleware is preparing as output, the
//! cancellation signal scoped to this message, and two feature sets. The
//! source-side set is populated by the message source before the context is
//! handed out; the destination-side set is populated when an output
//! destination is attached.

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use crate::features::FeatureSet;

/// One in-flight message and everything the chain may act on.
pub struct MessageContext {
    source_payload: Bytes,
    destination_payload: BytesMut,
    cancellation: CancellationToken,
    source_features: FeatureSet,
    destination_features: FeatureSet,
}

impl MessageContext {
    /// Create a context with a source payload, the capabilities the source
    /// registered, and a cancellation signal scoped to this message.
    ///
    /// Sources driving a shared loop should pass a child of the loop's token
    /// so loop shutdown propagates into in-flight work, while per-message
    /// cancellation stays contained.
    pub fn new(
        source_payload: impl Into<Bytes>,
        source_features: FeatureSet,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            source_payload: source_payload.into(),
            destination_payload: BytesMut::new(),
            cancellation,
            source_features,
            destination_features: FeatureSet::new(),
        }
    }

    /// Create a bare context: no capabilities, fresh cancellation token.
    pub fn from_payload(source_payload: impl Into<Bytes>) -> Self {
        Self::new(source_payload, FeatureSet::new(), CancellationToken::new())
    }

    /// The payload the message arrived with. Fixed at construction.
    pub fn source_payload(&self) -> &Bytes {
        &self.source_payload
    }

    /// The output bytes prepared so far
    pub fn destination_payload(&self) -> &[u8] {
        &self.destination_payload
    }

    /// Mutable access to the output bytes
    pub fn destination_payload_mut(&mut self) -> &mut BytesMut {
        &mut self.destination_payload
    }

    /// Replace the output bytes wholesale
    pub fn set_destination_payload(&mut self, payload: impl AsRef<[u8]>) {
        self.destination_payload.clear();
        self.destination_payload.extend_from_slice(payload.as_ref());
    }

    /// The cancellation signal for this message
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Check the cancellation signal without suspending
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Capabilities registered by the source
    pub fn source_features(&self) -> &FeatureSet {
        &self.source_features
    }

    /// Mutable access to the source-side capabilities
    pub fn source_features_mut(&mut self) -> &mut FeatureSet {
        &mut self.source_features
    }

    /// Capabilities registered by an attached destination
    pub fn destination_features(&self) -> &FeatureSet {
        &self.destination_features
    }

    /// Mutable access to the destination-side capabilities
    pub fn destination_features_mut(&mut self) -> &mut FeatureSet {
        &mut self.destination_features
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("source_payload_len", &self.source_payload.len())
            .field("destination_payload_len", &self.destination_payload.len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("source_features", &self.source_features)
            .field("destination_features", &self.destination_features)
            .finish()
    }
}
