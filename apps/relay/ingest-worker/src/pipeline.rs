//! Event processing pipeline: validation guard, normalization, delivery policy.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_pipeline::{
    Chain, ConsumerHooks, Handler, MessageContext, Middleware, Next, PipelineError,
    VisibilityKeepAlive,
};
use serde::{Deserialize, Serialize};
use storage_queue::{MessageInfo, ProcessingStateHandle};
use tracing::{debug, warn};
use uuid::Uuid;

/// Wire format accepted by the ingress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Relay output written to the destination payload.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub relayed_at: DateTime<Utc>,
}

/// Guard middleware that keeps malformed events away from the handler.
///
/// A payload that cannot parse today will not parse on redelivery either, so
/// the guard deletes it and short-circuits successfully instead of feeding
/// the retry policy.
pub struct ValidateEvent;

impl ValidateEvent {
    async fn discard(&self, ctx: &MessageContext, reason: &str) -> Result<(), PipelineError> {
        warn!(reason = %reason, "Discarding unparseable event");
        match ctx.deletion() {
            Some(deletion) => {
                if let Err(err) = deletion.delete().await {
                    warn!(error = %err, "Failed to delete poison event, leaving it to its visibility window");
                }
            }
            None => warn!("No deletion capability configured, poison event will reappear"),
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for ValidateEvent {
    fn name(&self) -> &str {
        "validate-event"
    }

    async fn handle(&self, ctx: &mut MessageContext, next: Next<'_>) -> Result<(), PipelineError> {
        let envelope = match serde_json::from_slice::<EventEnvelope>(ctx.source_payload()) {
            Ok(envelope) if !envelope.event_type.is_empty() => envelope,
            Ok(_) => return self.discard(ctx, "empty event type").await,
            Err(err) => return self.discard(ctx, &err.to_string()).await,
        };

        ctx.destination_features_mut().insert(envelope);
        next.run(ctx).await
    }
}

/// Terminal handler that stamps the event and re-serializes it.
pub struct NormalizeEvent;

#[async_trait]
impl Handler for NormalizeEvent {
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        let envelope = match ctx.destination_features_mut().remove::<EventEnvelope>() {
            Some(envelope) => envelope,
            // Standalone use without the validation guard.
            None => serde_json::from_slice(ctx.source_payload())?,
        };

        let normalized = NormalizedEvent {
            id: Uuid::new_v4(),
            event_type: envelope.event_type,
            payload: envelope.payload,
            occurred_at: envelope.occurred_at.unwrap_or_else(Utc::now),
            relayed_at: Utc::now(),
        };

        let body = serde_json::to_vec(&normalized)?;
        ctx.set_destination_payload(body);
        debug!(event_type = %normalized.event_type, "Event normalized");
        Ok(())
    }
}

/// Delivery policy for the relay: acknowledge successes, postpone failures
/// with exponential backoff, drop events whose delivery budget is spent.
pub struct RelayHooks {
    max_attempts: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl RelayHooks {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            max_retry_delay: Duration::from_secs(300),
        }
    }

    pub fn with_max_retry_delay(mut self, max: Duration) -> Self {
        self.max_retry_delay = max;
        self
    }

    /// Delay before the next delivery, doubling per attempt up to the cap.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay)
    }
}

#[async_trait]
impl ConsumerHooks for RelayHooks {
    async fn on_completion(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        // The validation guard settles poison messages itself; acknowledging
        // again would only burn a stale receipt.
        let settled = match ctx.source_features().get::<ProcessingStateHandle>() {
            Some(state) => state.is_settled().await,
            None => false,
        };
        if settled {
            debug!("Message already settled, skipping acknowledgement");
            return Ok(());
        }

        ctx.mark_complete().await?;
        debug!(
            bytes = %ctx.destination_payload().len(),
            "Relayed event acknowledged"
        );
        Ok(())
    }

    async fn on_failure(
        &self,
        ctx: &mut MessageContext,
        error: &PipelineError,
    ) -> Result<(), PipelineError> {
        let attempt = ctx
            .source_features()
            .get::<MessageInfo>()
            .map(|info| info.dequeue_count)
            .unwrap_or(1);

        let action = if attempt >= self.max_attempts {
            warn!(attempt = %attempt, error = %error, "Delivery budget exhausted, dropping event");
            match ctx.require_deletion() {
                Ok(deletion) => deletion.delete().await,
                Err(err) => Err(err),
            }
        } else {
            let delay = self.backoff(attempt);
            warn!(
                attempt = %attempt,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Postponing event for retry"
            );
            match ctx.require_postponement() {
                Ok(postponement) => postponement.postpone(delay).await,
                Err(err) => Err(err),
            }
        };

        if let Err(action_err) = action {
            if let Some(state) = ctx.source_features().get::<ProcessingStateHandle>() {
                state.mark_failed().await;
            }
            warn!(error = %action_err, "Queue action failed, leaving message to its visibility window");
        }
        Ok(())
    }
}

/// Build the relay chain: validation guard outermost, then visibility
/// keep-alive, then normalization.
///
/// Validation runs before the keep-alive so malformed payloads are dropped
/// without starting renewal work.
pub fn build_chain(keepalive: VisibilityKeepAlive) -> Chain {
    Chain::builder()
        .with(ValidateEvent)
        .with(keepalive)
        .handler(NormalizeEvent)
}
