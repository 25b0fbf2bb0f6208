//! Consumer loop driving fetched messages through the middleware chain
//!
//! Each cycle moves through `Idle -> Fetching -> Processing ->
//! Completing/Failing -> Idle`. Chain failures are captured at the loop
//! boundary and handed to the failure callback; they never escape a single
//! fetch-process cycle. Only fetch errors can end the loop, and the loop's
//! own lifetime ends only through the caller's cancellation token.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::MessageContext;
use crate::error::PipelineError;
use crate::health::Heartbeat;
use crate::metrics::PipelineMetrics;
use crate::middleware::Chain;
use crate::source::MessageSource;

/// Loop state, exported for logs and the state-transition counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    Fetching,
    Processing,
    Completing,
    Failing,
}

/// Outcome of a single fetch-process cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source had nothing available.
    Idle,
    /// The chain succeeded and the success callback was dispatched.
    Completed,
    /// The chain failed and the failure callback was dispatched.
    Failed,
    /// The chain observed cancellation; no callback was dispatched and the
    /// message was left untouched.
    Cancelled,
}

/// Post-processing callbacks dispatched by the loop. Both default to no-ops.
///
/// The loop never completes, deletes, or postpones a message on its own;
/// `on_completion` is where a concrete consumer acknowledges the message
/// (for example via [`MessageContext::mark_complete`]) and `on_failure` is
/// where postpone-vs-dead-letter policy lives.
#[async_trait]
pub trait ConsumerHooks: Send + Sync {
    /// Runs after the chain succeeds.
    async fn on_completion(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Runs after the chain fails, with the originating failure.
    async fn on_failure(
        &self,
        _ctx: &mut MessageContext,
        _error: &PipelineError,
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The default hooks: do nothing on either path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl ConsumerHooks for NoopHooks {}

/// Configuration for the consumer loop
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer name used in logs and metric labels
    pub consumer_name: String,

    /// Delay before polling again after an empty fetch
    pub idle_delay: Duration,

    /// Consecutive retryable fetch errors tolerated before the loop exits
    pub max_fetch_errors: u32,

    /// Base backoff after a retryable fetch error; doubles per consecutive
    /// error up to `max_fetch_backoff`
    pub fetch_backoff: Duration,

    /// Cap for the fetch error backoff
    pub max_fetch_backoff: Duration,
}

impl ConsumerConfig {
    /// Create a config with the given consumer name
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            ..Self::default()
        }
    }

    /// Set the idle polling delay
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Set the consecutive fetch error budget
    pub fn with_max_fetch_errors(mut self, max: u32) -> Self {
        self.max_fetch_errors = max.max(1);
        self
    }

    /// Set the base fetch error backoff
    pub fn with_fetch_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_backoff = backoff;
        self
    }

    /// Set the fetch error backoff cap
    pub fn with_max_fetch_backoff(mut self, cap: Duration) -> Self {
        self.max_fetch_backoff = cap;
        self
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_name: format!("consumer-{}", Uuid::new_v4()),
            idle_delay: Duration::from_millis(500),
            max_fetch_errors: 5,
            fetch_backoff: Duration::from_millis(500),
            max_fetch_backoff: Duration::from_secs(30),
        }
    }
}

/// Drives messages from a source through a composed chain and dispatches the
/// completion/failure callbacks.
pub struct Consumer<S> {
    source: S,
    chain: Chain,
    hooks: Arc<dyn ConsumerHooks>,
    config: ConsumerConfig,
    metrics: PipelineMetrics,
    state: Arc<RwLock<ConsumerState>>,
    heartbeat: Heartbeat,
}

impl<S: MessageSource> Consumer<S> {
    /// Create a consumer with the default no-op hooks
    pub fn new(source: S, chain: Chain, config: ConsumerConfig) -> Self {
        let metrics = PipelineMetrics::new(config.consumer_name.clone());
        Self {
            source,
            chain,
            hooks: Arc::new(NoopHooks),
            config,
            metrics,
            state: Arc::new(RwLock::new(ConsumerState::Idle)),
            heartbeat: Heartbeat::new(),
        }
    }

    /// Replace the post-processing hooks
    pub fn with_hooks(mut self, hooks: impl ConsumerHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Heartbeat touched on every cycle; share it with a [`crate::HealthState`]
    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat.clone()
    }

    /// Current loop state
    pub fn state(&self) -> ConsumerState {
        *self.state.read().unwrap()
    }

    fn set_state(&self, next: ConsumerState) {
        *self.state.write().unwrap() = next;
        self.metrics.state_transition(&next.to_string());
    }

    /// Run one full fetch-process cycle.
    ///
    /// Chain failures and callback failures never surface here; the only
    /// error path is a fetch failure, which the caller may treat as the
    /// source becoming unusable.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.set_state(ConsumerState::Fetching);
        let fetched = match self.source.fetch(cancel).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.metrics.fetch_error();
                self.set_state(ConsumerState::Idle);
                return Err(err);
            }
        };

        let Some(mut ctx) = fetched else {
            self.metrics.fetch_empty();
            self.set_state(ConsumerState::Idle);
            self.heartbeat.touch();
            return Ok(RunOutcome::Idle);
        };

        self.metrics.message_fetched();
        self.metrics.in_flight(1);
        self.set_state(ConsumerState::Processing);

        let started = Instant::now();
        let result = self.chain.execute(&mut ctx).await;
        let duration = started.elapsed();

        let outcome = match result {
            Ok(()) => {
                self.set_state(ConsumerState::Completing);
                self.metrics.message_processed(duration);
                debug!(
                    duration_ms = duration.as_millis() as u64,
                    "Message processed"
                );
                if let Err(hook_err) = self.hooks.on_completion(&mut ctx).await {
                    warn!(error = %hook_err, "Completion callback failed");
                    self.metrics.callback_error("completion");
                }
                RunOutcome::Completed
            }
            Err(err) if err.is_cancelled() => {
                // Not a failure: the message stays untouched so the
                // visibility timeout can hand it to another consumer.
                self.metrics.message_cancelled();
                debug!("Processing cancelled, leaving message untouched");
                RunOutcome::Cancelled
            }
            Err(err) => {
                self.set_state(ConsumerState::Failing);
                let category = err.category();
                self.metrics.message_failed(category.as_str());
                warn!(
                    error = %err,
                    category = category.as_str(),
                    duration_ms = duration.as_millis() as u64,
                    "Message processing failed"
                );
                if let Err(hook_err) = self.hooks.on_failure(&mut ctx, &err).await {
                    warn!(error = %hook_err, "Failure callback failed");
                    self.metrics.callback_error("failure");
                }
                RunOutcome::Failed
            }
        };

        // The context is discarded after the callbacks return; stop any
        // per-message background work it still anchors.
        ctx.cancellation().cancel();
        self.metrics.in_flight(0);
        self.set_state(ConsumerState::Idle);
        self.heartbeat.touch();
        Ok(outcome)
    }

    /// Drive [`Self::run_once`] until `cancel` fires.
    ///
    /// Empty fetches wait out the idle delay. Retryable fetch errors back
    /// off exponentially under the consecutive-error budget; a non-retryable
    /// fetch error or an exhausted budget ends the loop with the error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        info!(
            consumer = %self.config.consumer_name,
            source = %self.source.name(),
            middleware = self.chain.depth(),
            "Consumer loop starting"
        );

        let mut consecutive_fetch_errors: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_once(&cancel).await {
                Ok(RunOutcome::Idle) => {
                    consecutive_fetch_errors = 0;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_delay) => {}
                    }
                }
                Ok(_) => {
                    consecutive_fetch_errors = 0;
                }
                Err(err) => {
                    consecutive_fetch_errors += 1;
                    if !err.is_retryable()
                        || consecutive_fetch_errors >= self.config.max_fetch_errors
                    {
                        error!(
                            error = %err,
                            consecutive_errors = consecutive_fetch_errors,
                            "Source unusable, stopping consumer loop"
                        );
                        return Err(err);
                    }

                    let delay = self.fetch_backoff_delay(consecutive_fetch_errors);
                    warn!(
                        error = %err,
                        consecutive_errors = consecutive_fetch_errors,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(
            consumer = %self.config.consumer_name,
            "Consumer loop stopped"
        );
        Ok(())
    }

    /// Exponential backoff for consecutive fetch errors, capped
    fn fetch_backoff_delay(&self, consecutive_errors: u32) -> Duration {
        let base = self.config.fetch_backoff.as_millis() as u64;
        let cap = self.config.max_fetch_backoff.as_millis() as u64;
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        let delay = base.saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay.min(cap))
    }
}
