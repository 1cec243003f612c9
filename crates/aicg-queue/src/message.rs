//! Envelope carried on the task stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aicg_models::{TaskId, TaskKind};

/// A pointer to a durable task row.
///
/// Payloads stay in the relational store; the stream only signals that
/// a task is ready to run. The id doubles as the dedup key so a task
/// can sit on the stream at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(task_id: TaskId, kind: TaskKind) -> Self {
        Self { task_id, kind, enqueued_at: Utc::now() }
    }

    /// Deduplication key for the enqueue path.
    pub fn idempotency_key(&self) -> String {
        format!("task:{}", self.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_message_serde_roundtrip() {
        let msg = TaskMessage::new(TaskId::from_string("t-1"), TaskKind::Image);
        let json = serde_json::to_string(&msg).expect("serialize TaskMessage");
        let decoded: TaskMessage = serde_json::from_str(&json).expect("deserialize TaskMessage");
        assert_eq!(decoded.task_id, msg.task_id);
        assert_eq!(decoded.kind, TaskKind::Image);
        assert_eq!(decoded.enqueued_at, msg.enqueued_at);
        assert_eq!(decoded.idempotency_key(), "task:t-1");
    }
}
