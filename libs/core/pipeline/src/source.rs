//! Message source abstraction

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::MessageContext;
use crate::error::PipelineError;

/// Produces the next available message as a fully populated context.
///
/// Implementations register every capability their transport can offer into
/// the context's source features before returning it. A source whose messages
/// are ever expected to be completed must register a completion capability;
/// this is a documented precondition, not enforced by the type system, and a
/// consumer that later asks for the missing capability receives a
/// configuration error for that message.
///
/// The context's cancellation token should be a child of `cancel` so that
/// loop shutdown reaches in-flight work while per-message cancellation stays
/// contained.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch the next message, or `None` when nothing is available.
    ///
    /// May suspend on the underlying transport. If `cancel` fires mid-fetch,
    /// returns `Ok(None)` promptly, having acquired nothing.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageContext>, PipelineError>;

    /// Source name used in logs and metrics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
