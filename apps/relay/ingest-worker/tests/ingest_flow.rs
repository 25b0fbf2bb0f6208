//! End-to-end tests for the relay pipeline over the in-memory queue

use std::sync::Arc;
use std::time::Duration;

use message_pipeline::{Chain, Consumer, ConsumerConfig, RunOutcome, VisibilityKeepAlive};
use relay_ingest_worker::pipeline::{NormalizeEvent, RelayHooks, build_chain};
use storage_queue::{MemoryQueue, StorageQueueConfig, StorageQueueSource};
use test_utils::TestDataBuilder;
use tokio_util::sync::CancellationToken;

fn consumer_for(
    queue: &Arc<MemoryQueue>,
    chain: Chain,
    hooks: RelayHooks,
) -> Consumer<StorageQueueSource<MemoryQueue>> {
    let source = StorageQueueSource::from_shared(
        queue.clone(),
        StorageQueueConfig::new().with_visibility_timeout(Duration::from_secs(60)),
    );
    Consumer::new(source, chain, ConsumerConfig::new("relay-test")).with_hooks(hooks)
}

#[tokio::test]
async fn test_valid_event_is_normalized_and_acknowledged() {
    let queue = Arc::new(MemoryQueue::new());
    let data = TestDataBuilder::from_test_name("valid_event");
    queue.push(data.json_event("user.created")).await;

    let chain = build_chain(VisibilityKeepAlive::with_extension(Duration::from_secs(30)));
    let consumer = consumer_for(
        &queue,
        chain,
        RelayHooks::new(3, Duration::from_millis(20)),
    );

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(queue.is_empty().await, "acknowledged event is deleted");
}

#[tokio::test]
async fn test_poison_event_is_dropped_without_retries() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"definitely not json"[..]).await;

    let chain = build_chain(VisibilityKeepAlive::with_extension(Duration::from_secs(30)));
    let consumer = consumer_for(
        &queue,
        chain,
        RelayHooks::new(3, Duration::from_millis(20)),
    );

    // The validation guard deletes the message and short-circuits, so the
    // cycle completes instead of entering the retry path.
    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_empty_event_type_is_treated_as_poison() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&br#"{"event_type":""}"#[..]).await;

    let chain = build_chain(VisibilityKeepAlive::with_extension(Duration::from_secs(30)));
    let consumer = consumer_for(
        &queue,
        chain,
        RelayHooks::new(3, Duration::from_millis(20)),
    );

    let outcome = consumer
        .run_once(&CancellationToken::new())
        .await
        .expect("cycle should not fail");

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_handler_failure_postpones_then_drops_after_budget() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(&b"unparseable"[..]).await;

    // No validation guard here, so the handler itself rejects the payload
    // and the delivery policy takes over.
    let chain = Chain::builder().handler(NormalizeEvent);
    let consumer = consumer_for(&queue, chain, RelayHooks::new(2, Duration::from_millis(30)));
    let cancel = CancellationToken::new();

    // First delivery fails and is postponed.
    let outcome = consumer.run_once(&cancel).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(queue.len().await, 1);

    // Hidden until the retry delay elapses.
    assert_eq!(consumer.run_once(&cancel).await.unwrap(), RunOutcome::Idle);
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Second delivery exhausts the budget and the event is dropped.
    let outcome = consumer.run_once(&cancel).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    assert!(queue.is_empty().await);
}
