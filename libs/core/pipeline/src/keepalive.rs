//! Background visibility renewal for long-running handlers
//!
//! Queue transports hide a fetched message for a bounded visibility window.
//! When processing can outlast that window, this middleware keeps extending
//! it from a background task while the rest of the chain runs, then stops the
//! task before handing the result back up. Renewals never outlive the
//! traversal, so they cannot race the completion callbacks.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, trace, warn};

use crate::context::MessageContext;
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::middleware::{Middleware, Next};

/// Middleware that periodically extends message visibility while downstream
/// middleware and the handler run.
///
/// Requires the visibility-extension capability; when the source registered
/// none, the middleware logs and passes straight through.
#[derive(Debug, Clone)]
pub struct VisibilityKeepAlive {
    interval: Duration,
    extension: Duration,
    metrics: Option<PipelineMetrics>,
}

impl VisibilityKeepAlive {
    /// Renew every `interval`, pushing the horizon to `extension` from now
    pub fn new(interval: Duration, extension: Duration) -> Self {
        Self {
            interval,
            extension,
            metrics: None,
        }
    }

    /// Renew at a third of `extension`, leaving two missed renewals of slack
    /// before the message becomes visible again
    pub fn with_extension(extension: Duration) -> Self {
        Self::new(extension / 3, extension)
    }

    /// Label renewal metrics with the owning consumer's name
    pub fn for_consumer(mut self, consumer_name: impl Into<String>) -> Self {
        self.metrics = Some(PipelineMetrics::new(consumer_name));
        self
    }
}

#[async_trait]
impl Middleware for VisibilityKeepAlive {
    fn name(&self) -> &str {
        "visibility-keep-alive"
    }

    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        let Some(extender) = ctx.visibility_extension() else {
            debug!("No visibility-extension capability registered, skipping keep-alive");
            return next.run(ctx).await;
        };

        let stop = ctx.cancellation().child_token();
        let interval = self.interval;
        let extension = self.extension;
        let metrics = self.metrics.clone();
        let renewals = tokio::spawn({
            let stop = stop.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    match extender.extend_visibility(extension).await {
                        Ok(()) => {
                            match &metrics {
                                Some(metrics) => metrics.keepalive_renewal(),
                                None => counter!("pipeline_keepalive_renewals_total").increment(1),
                            }
                            trace!(extension_ms = extension.as_millis() as u64, "Visibility extended");
                        }
                        Err(err) if err.is_handle_invalid() => {
                            // The receipt was consumed elsewhere; further
                            // renewals can only fail the same way.
                            warn!(error = %err, "Visibility handle no longer valid, stopping keep-alive");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "Visibility extension failed, will retry");
                        }
                    }
                }
            }
        });

        let result = next.run(ctx).await;

        stop.cancel();
        let _ = renewals.await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ExtendVisibility;
    use crate::features::FeatureSet;
    use crate::middleware::{Chain, Handler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct CountingExtender {
        calls: AtomicUsize,
        // Calls numbered from 1; this call and later ones report a dead handle.
        invalid_from: Option<usize>,
    }

    impl CountingExtender {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                invalid_from: None,
            })
        }

        fn invalid_from(call: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                invalid_from: Some(call),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtendVisibility for CountingExtender {
        async fn extend_visibility(&self, _timeout: Duration) -> Result<(), PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(from) = self.invalid_from {
                if call >= from {
                    return Err(PipelineError::handle_invalid("pop receipt superseded"));
                }
            }
            Ok(())
        }
    }

    struct SleepingHandler {
        duration: Duration,
    }

    #[async_trait]
    impl Handler for SleepingHandler {
        async fn call(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
            tokio::time::sleep(self.duration).await;
            Ok(())
        }
    }

    fn context_with_extender(extender: Arc<CountingExtender>) -> MessageContext {
        let mut features = FeatureSet::new();
        features.insert::<Arc<dyn ExtendVisibility>>(extender);
        MessageContext::new(&b"payload"[..], features, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_renews_visibility_while_handler_runs() {
        let extender = CountingExtender::healthy();
        let chain = Chain::builder()
            .with(VisibilityKeepAlive::new(
                Duration::from_millis(10),
                Duration::from_millis(100),
            ))
            .handler(SleepingHandler {
                duration: Duration::from_millis(55),
            });
        let mut ctx = context_with_extender(extender.clone());

        chain.execute(&mut ctx).await.unwrap();

        assert!(
            extender.calls() >= 2,
            "expected at least two renewals, saw {}",
            extender.calls()
        );
    }

    #[tokio::test]
    async fn test_renewals_stop_when_the_chain_returns() {
        let extender = CountingExtender::healthy();
        let chain = Chain::builder()
            .with(VisibilityKeepAlive::new(
                Duration::from_millis(5),
                Duration::from_millis(50),
            ))
            .handler(SleepingHandler {
                duration: Duration::from_millis(20),
            });
        let mut ctx = context_with_extender(extender.clone());

        chain.execute(&mut ctx).await.unwrap();
        let after_return = extender.calls();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(extender.calls(), after_return);
    }

    #[tokio::test]
    async fn test_invalid_handle_stops_renewals() {
        let extender = CountingExtender::invalid_from(1);
        let chain = Chain::builder()
            .with(VisibilityKeepAlive::new(
                Duration::from_millis(5),
                Duration::from_millis(50),
            ))
            .handler(SleepingHandler {
                duration: Duration::from_millis(60),
            });
        let mut ctx = context_with_extender(extender.clone());

        chain.execute(&mut ctx).await.unwrap();

        // First renewal reports a dead handle and the task gives up.
        assert_eq!(extender.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_capability_passes_through() {
        let chain = Chain::builder()
            .with(VisibilityKeepAlive::with_extension(Duration::from_millis(30)))
            .handler(SleepingHandler {
                duration: Duration::from_millis(5),
            });
        let mut ctx = MessageContext::from_payload(&b"payload"[..]);

        chain.execute(&mut ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_renewals_carry_the_consumer_label() {
        crate::metrics::init_metrics();

        let extender = CountingExtender::healthy();
        let chain = Chain::builder()
            .with(
                VisibilityKeepAlive::new(Duration::from_millis(10), Duration::from_millis(100))
                    .for_consumer("keepalive-label-test"),
            )
            .handler(SleepingHandler {
                duration: Duration::from_millis(35),
            });
        let mut ctx = context_with_extender(extender.clone());

        chain.execute(&mut ctx).await.unwrap();
        assert!(extender.calls() >= 1, "expected at least one renewal");

        let rendered = crate::metrics::render_metrics();
        assert!(rendered.contains("pipeline_keepalive_renewals_total"));
        assert!(rendered.contains("consumer=\"keepalive-label-test\""));
    }
}
