//! End-to-end tests driving the consumer loop over the in-memory queue

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use message_pipeline::{
    Chain, Consumer, ConsumerConfig, ConsumerHooks, Handler, MessageContext, Middleware, Next,
    PipelineError, RunOutcome, VisibilityKeepAlive,
};
use storage_queue::{
    MemoryQueue, MessageInfo, QueueTransport, StorageQueueConfig, StorageQueueSource,
};
use test_utils::CallLog;
use tokio_util::sync::CancellationToken;

struct Recording {
    label: &'static str,
    log: CallLog,
}

#[async_trait]
impl Middleware for Recording {
    fn name(&self) -> &str {
        self.label
    }

    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> Result<(), PipelineError> {
        self.log.push(format!("{}-before", self.label));
        let result = next.run(ctx).await;
        self.log.push(format!("{}-after", self.label));
        result
    }
}

struct LoggingHandler {
    log: CallLog,
    sleep: Duration,
    fail: bool,
}

impl LoggingHandler {
    fn succeeding(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            sleep: Duration::ZERO,
            fail: false,
        }
    }

    fn failing(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            sleep: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl Handler for LoggingHandler {
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        if !self.sleep.is_zero() {
            tokio::time::sleep(self.sleep).await;
        }
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.log.push("H");
        if self.fail {
            Err(PipelineError::handler("handler rejected the message"))
        } else {
            Ok(())
        }
    }
}

/// Records callback dispatches without touching the queue.
struct RecordOnlyHooks {
    log: CallLog,
}

#[async_trait]
impl ConsumerHooks for RecordOnlyHooks {
    async fn on_completion(&self, _ctx: &mut MessageContext) -> Result<(), PipelineError> {
        self.log.push("success-callback");
        Ok(())
    }

    async fn on_failure(
        &self,
        _ctx: &mut MessageContext,
        error: &PipelineError,
    ) -> Result<(), PipelineError> {
        self.log.push(format!("failure-callback:{error}"));
        Ok(())
    }
}

/// Acknowledges successes by invoking the registered completion capability.
struct AckHooks {
    log: CallLog,
}

#[async_trait]
impl ConsumerHooks for AckHooks {
    async fn on_completion(&self, ctx: &mut MessageContext) -> Result<(), PipelineError> {
        ctx.mark_complete().await?;
        self.log.push("acked");
        Ok(())
    }
}

/// Postpones failures until the delivery budget runs out, then deletes.
struct RetryHooks {
    log: CallLog,
    retry_delay: Duration,
    max_attempts: u32,
}

#[async_trait]
impl ConsumerHooks for RetryHooks {
    async fn on_failure(
        &self,
        ctx: &mut MessageContext,
        _error: &PipelineError,
    ) -> Result<(), PipelineError> {
        let attempts = ctx
            .source_features()
            .get::<MessageInfo>()
            .map(|info| info.dequeue_count)
            .unwrap_or(0);

        if attempts >= self.max_attempts {
            ctx.require_deletion()?.delete().await?;
            self.log.push(format!("dead-lettered:attempt-{attempts}"));
        } else {
            ctx.require_postponement()?
                .postpone(self.retry_delay)
                .await?;
            self.log.push(format!("postponed:attempt-{attempts}"));
        }
        Ok(())
    }
}

fn source_for(queue: &Arc<MemoryQueue>, visibility: Duration) -> StorageQueueSource<MemoryQueue> {
    StorageQueueSource::from_shared(
        queue.clone(),
        StorageQueueConfig::new().with_visibility_timeout(visibility),
    )
}

#[tokio::test]
async fn test_three_middleware_wrap_the_handler_in_declared_order() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"payload"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder()
        .with(Recording {
            label: "A",
            log: log.clone(),
        })
        .with(Recording {
            label: "B",
            log: log.clone(),
        })
        .with(Recording {
            label: "C",
            log: log.clone(),
        })
        .handler(LoggingHandler::succeeding(&log));

    let consumer = Consumer::new(
        source_for(&queue, Duration::from_secs(60)),
        chain,
        ConsumerConfig::new("flow-test"),
    )
    .with_hooks(RecordOnlyHooks { log: log.clone() });

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        log.entries(),
        vec![
            "A-before",
            "B-before",
            "C-before",
            "H",
            "C-after",
            "B-after",
            "A-after",
            "success-callback",
        ]
    );

    // The loop itself never deletes: with record-only hooks the message is
    // still in the queue, just hidden by its visibility window.
    assert_eq!(queue.len().await, 1);
}

#[tokio::test]
async fn test_completion_is_the_callbacks_explicit_choice() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"payload"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder().handler(LoggingHandler::succeeding(&log));
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_secs(60)),
        chain,
        ConsumerConfig::new("ack-test"),
    )
    .with_hooks(AckHooks { log: log.clone() });

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(log.entries(), vec!["H", "acked"]);
    assert!(queue.is_empty().await, "completion capability deletes");
}

#[tokio::test]
async fn test_failure_dispatches_once_with_the_original_error() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"payload"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder().handler(LoggingHandler::failing(&log));
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_secs(60)),
        chain,
        ConsumerConfig::new("failure-test"),
    )
    .with_hooks(RecordOnlyHooks { log: log.clone() });

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("handler failures stay inside the cycle");

    assert_eq!(outcome, RunOutcome::Failed);

    let entries = log.entries();
    let failures: Vec<_> = entries
        .iter()
        .filter(|e| e.starts_with("failure-callback"))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("handler rejected the message"));
    assert!(!entries.iter().any(|e| e == "success-callback"));

    assert_eq!(queue.len().await, 1, "failed message is left to its window");
}

#[tokio::test]
async fn test_retry_policy_postpones_then_dead_letters() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"poison"[..]).await;

    let log = CallLog::new();
    let hooks = RetryHooks {
        log: log.clone(),
        retry_delay: Duration::from_millis(50),
        max_attempts: 2,
    };
    let chain = Chain::builder().handler(LoggingHandler::failing(&log));
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_secs(60)),
        chain,
        ConsumerConfig::new("retry-test"),
    )
    .with_hooks(hooks);
    let cancel = CancellationToken::new();

    // First delivery fails and is postponed for retry.
    let outcome = consumer.run_once(&cancel).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(queue.len().await, 1);

    // Hidden until the postpone delay elapses.
    assert_eq!(consumer.run_once(&cancel).await.unwrap(), RunOutcome::Idle);
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Second delivery exhausts the budget and the hook deletes.
    let outcome = consumer.run_once(&cancel).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    assert!(queue.is_empty().await);

    test_utils::assertions::assert_subsequence(
        &log.entries(),
        &["postponed:attempt-1", "dead-lettered:attempt-2"],
        "retry escalation",
    );
}

#[tokio::test]
async fn test_keepalive_holds_the_claim_through_slow_processing() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"slow"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder()
        .with(VisibilityKeepAlive::new(
            Duration::from_millis(20),
            Duration::from_millis(200),
        ))
        .handler(LoggingHandler {
            log: log.clone(),
            sleep: Duration::from_millis(150),
            fail: false,
        });

    // Initial visibility is far shorter than processing takes; only the
    // keep-alive renewals keep the receipt current for the final ack.
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_millis(60)),
        chain,
        ConsumerConfig::new("keepalive-test"),
    )
    .with_hooks(AckHooks { log: log.clone() });

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(queue.is_empty().await, "ack used a live, rotated receipt");
}

#[tokio::test]
async fn test_cancellation_mid_processing_leaves_the_message() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"payload"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder().handler(LoggingHandler {
        log: log.clone(),
        sleep: Duration::from_millis(60),
        fail: false,
    });
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_secs(60)),
        chain,
        ConsumerConfig::new("cancel-test"),
    )
    .with_hooks(RecordOnlyHooks { log: log.clone() });

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        stop.cancel();
    });

    let outcome = consumer.run_once(&cancel).await.unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(log.entries().is_empty(), "no handler log, no callbacks");
    assert_eq!(queue.len().await, 1, "cancelled message is never deleted");
}

#[tokio::test]
async fn test_cancelling_before_fetch_acquires_nothing() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"payload"[..]).await;

    let log = CallLog::new();
    let chain = Chain::builder().handler(LoggingHandler::succeeding(&log));
    let consumer = Consumer::new(
        source_for(&queue, Duration::from_millis(40)),
        chain,
        ConsumerConfig::new("precancel-test"),
    )
    .with_hooks(RecordOnlyHooks { log: log.clone() });

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = consumer.run_once(&cancel).await.unwrap();
    assert_eq!(outcome, RunOutcome::Idle);
    assert!(log.entries().is_empty());

    // The message was never claimed, so it is still receivable right away.
    let received = queue.receive(1, Duration::from_secs(1)).await.unwrap();
    assert_eq!(received.len(), 1);
}
