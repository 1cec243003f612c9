//! Redis/queue integration tests.

use std::time::Duration;

use aicg_models::{TaskId, TaskKind};
use aicg_queue::{QueueError, TaskMessage, TaskQueue};

fn fresh_message(kind: TaskKind) -> TaskMessage {
    TaskMessage::new(TaskId::new(), kind)
}

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn redis_connection() {
    dotenvy::dotenv().ok();

    let queue = TaskQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Enqueue/consume/ack cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_consume_ack() {
    dotenvy::dotenv().ok();

    let queue = TaskQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let msg = fresh_message(TaskKind::Image);
    let task_id = msg.task_id.clone();

    let message_id = queue.enqueue(&msg).await.expect("Failed to enqueue");
    println!("Enqueued task {} with message ID {}", task_id, message_id);

    let consumed = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");
    let (msg_id, consumed_msg) = consumed
        .iter()
        .find(|(_, m)| m.task_id == task_id)
        .expect("Enqueued task not delivered");
    assert_eq!(consumed_msg.kind, TaskKind::Image);

    queue.ack(msg_id).await.expect("Failed to ack");
    queue.clear_dedup(&msg).await.expect("Failed to clear dedup");
}

/// The same task id cannot sit on the stream twice.
#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_enqueue_is_rejected() {
    dotenvy::dotenv().ok();

    let queue = TaskQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let msg = fresh_message(TaskKind::Text);
    queue.enqueue(&msg).await.expect("First enqueue failed");

    match queue.enqueue(&msg).await {
        Err(QueueError::EnqueueFailed { .. }) => {}
        other => panic!("expected duplicate rejection, got {other:?}"),
    }

    // After clearing the dedup key the task can be queued again.
    queue.clear_dedup(&msg).await.expect("Failed to clear dedup");
    queue.enqueue(&msg).await.expect("Re-enqueue after clear failed");
    queue.clear_dedup(&msg).await.ok();
}

/// Delayed tasks surface only after promotion.
#[tokio::test]
#[ignore = "requires Redis"]
async fn delayed_enqueue_promotes() {
    dotenvy::dotenv().ok();

    let queue = TaskQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let msg = fresh_message(TaskKind::Tts);
    queue
        .enqueue_with_delay(&msg, Duration::from_secs(1))
        .await
        .expect("Failed to schedule");

    // Not yet due.
    assert_eq!(queue.promote_scheduled().await.expect("promote"), 0);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let promoted = queue.promote_scheduled().await.expect("promote");
    assert_eq!(promoted, 1);

    queue.clear_dedup(&msg).await.ok();
}

/// Failed deliveries land on the DLQ.
#[tokio::test]
#[ignore = "requires Redis"]
async fn dlq_receives_failed_delivery() {
    dotenvy::dotenv().ok();

    let queue = TaskQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let msg = fresh_message(TaskKind::VideoSubmit);
    queue.enqueue(&msg).await.expect("Failed to enqueue");

    let consumed = queue
        .consume("dlq-test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");
    let (msg_id, delivered) = consumed
        .iter()
        .find(|(_, m)| m.task_id == msg.task_id)
        .expect("task not delivered");

    let before = queue.dlq_len().await.expect("dlq_len");
    queue
        .dlq(msg_id, delivered, "simulated terminal failure")
        .await
        .expect("Failed to move to DLQ");
    let after = queue.dlq_len().await.expect("dlq_len");

    assert_eq!(after, before + 1);
    queue.clear_dedup(&msg).await.ok();
}
