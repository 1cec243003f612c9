//! Task queue using Redis Streams.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::TaskMessage;

/// Key holding delayed messages, scored by visibility time.
const SCHEDULED_KEY: &str = "aicg:scheduled_tasks";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub queue_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Message visibility timeout before a crashed worker's delivery
    /// can be reclaimed
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: "redis://localhost:6379".to_string(),
            stream_name: "aicg:tasks".to_string(),
            consumer_group: "aicg:workers".to_string(),
            dlq_stream_name: "aicg:dlq".to_string(),
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue_url: std::env::var("QUEUE_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "aicg:tasks".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "aicg:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "aicg:dlq".to_string()),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Task queue client.
pub struct TaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl TaskQueue {
    /// Create a new task queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.queue_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a task message.
    ///
    /// Rejects the enqueue when the same task id is already on the
    /// stream (dedup key live).
    pub async fn enqueue(&self, msg: &TaskMessage) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(msg)?;
        let idempotency_key = msg.idempotency_key();

        let dedup_key = format!("aicg:dedup:{}", idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate task rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate task"));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        // Dedup TTL outlives any reasonable single delivery
        conn.set_ex::<_, _, ()>(&dedup_key, "1", 3600).await?;

        debug!("Enqueued task {} with message ID {}", msg.task_id, message_id);
        Ok(message_id)
    }

    /// Enqueue a task with a visibility delay.
    ///
    /// Used for retry backoff: the message sits in a sorted set until
    /// due, then [`Self::promote_scheduled`] moves it to the stream.
    pub async fn enqueue_with_delay(
        &self,
        msg: &TaskMessage,
        delay: Duration,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(msg)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let visible_at = now + delay.as_secs();

        redis::cmd("ZADD")
            .arg(SCHEDULED_KEY)
            .arg(visible_at)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        info!(
            task_id = %msg.task_id,
            delay_secs = delay.as_secs(),
            "Scheduled task with delay"
        );
        Ok(())
    }

    /// Move due scheduled tasks onto the main stream.
    ///
    /// Called periodically by the worker runtime. Returns the number of
    /// tasks promoted.
    pub async fn promote_scheduled(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(SCHEDULED_KEY)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut moved = 0;
        for payload in &due {
            match serde_json::from_str::<TaskMessage>(payload) {
                Ok(msg) => match self.enqueue(&msg).await {
                    Ok(_) => moved += 1,
                    Err(QueueError::EnqueueFailed { .. }) => {
                        debug!("Scheduled task was duplicate, dropping from schedule");
                    }
                    Err(e) => {
                        warn!("Failed to promote scheduled task: {}", e);
                        continue; // leave it scheduled
                    }
                },
                Err(e) => {
                    warn!("Failed to parse scheduled task: {}", e);
                }
            }

            redis::cmd("ZREM")
                .arg(SCHEDULED_KEY)
                .arg(payload)
                .query_async::<()>(&mut conn)
                .await
                .ok();
        }

        if moved > 0 {
            info!(count = moved, "Promoted scheduled tasks to main queue");
        }
        Ok(moved)
    }

    /// Consume task messages from the queue.
    ///
    /// Blocks up to `block_ms` and returns `(message_id, message)` pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, TaskMessage)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut messages = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("task") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<TaskMessage>(&payload_str) {
                        Ok(msg) => {
                            debug!("Consumed task {} from stream", msg.task_id);
                            messages.push((message_id, msg));
                        }
                        Err(e) => {
                            warn!("Failed to parse task payload: {}", e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(messages)
    }

    /// Acknowledge a delivery (mark as completed) and drop it from the
    /// stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged delivery: {}", message_id);
        Ok(())
    }

    /// Clear the deduplication key for a task, allowing re-enqueue.
    ///
    /// Called after the task reaches a terminal state or is rescheduled
    /// for retry.
    pub async fn clear_dedup(&self, msg: &TaskMessage) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let dedup_key = format!("aicg:dedup:{}", msg.idempotency_key());
        conn.del::<_, ()>(&dedup_key).await?;
        debug!("Cleared dedup key: {}", dedup_key);
        Ok(())
    }

    /// Move a delivery to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, msg: &TaskMessage, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(msg)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("task")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!("Moved task {} to DLQ: {}", msg.task_id, error);
        Ok(())
    }

    /// Claim pending deliveries idle beyond `min_idle_ms`.
    ///
    /// Recovers deliveries held by crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, TaskMessage)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending_count: usize = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await
            .map(|reply: redis::streams::StreamPendingReply| reply.count())
            .unwrap_or(0);

        if pending_count == 0 {
            return Ok(Vec::new());
        }

        let pending_details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // [id, consumer, idle_time_ms, delivery_count]
        let mut to_claim = Vec::new();
        for detail in pending_details {
            if detail.len() >= 4 {
                if let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Int(idle_ms))) =
                    (detail.first(), detail.get(2))
                {
                    if *idle_ms as u64 >= min_idle_ms {
                        if let Ok(id) = String::from_utf8(id_bytes.clone()) {
                            to_claim.push(id);
                        }
                    }
                }
            }
        }

        if to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for msg_id in &to_claim {
            cmd.arg(msg_id);
        }

        let claimed: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;

        let mut messages = Vec::new();
        for entry in claimed {
            // [id, [field1, value1, ...]]
            let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Array(fields))) =
                (entry.first(), entry.get(1))
            else {
                continue;
            };
            let Ok(message_id) = String::from_utf8(id_bytes.clone()) else {
                continue;
            };

            let mut payload: Option<String> = None;
            let mut i = 0;
            while i + 1 < fields.len() {
                if let (
                    Some(redis::Value::BulkString(field_bytes)),
                    Some(redis::Value::BulkString(value_bytes)),
                ) = (fields.get(i), fields.get(i + 1))
                {
                    if field_bytes.as_slice() == b"task" {
                        payload = String::from_utf8(value_bytes.clone()).ok();
                        break;
                    }
                }
                i += 2;
            }

            if let Some(payload) = payload {
                match serde_json::from_str::<TaskMessage>(&payload) {
                    Ok(msg) => {
                        info!("Claimed pending task {} from stream", msg.task_id);
                        messages.push((message_id, msg));
                    }
                    Err(e) => {
                        warn!("Failed to parse claimed task payload: {}", e);
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(messages)
    }

    /// Refresh ownership for a delivery still being processed.
    ///
    /// Resets the idle timer so long-running tasks are not reclaimed
    /// while active.
    pub async fn refresh_visibility(
        &self,
        consumer_name: &str,
        message_id: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _res: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(0)
            .arg(message_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Visibility timeout from config.
    pub fn visibility_timeout(&self) -> Duration {
        self.config.visibility_timeout
    }
}
