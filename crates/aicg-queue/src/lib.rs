//! Task broker over Redis Streams.
//!
//! The queue carries lightweight [`TaskMessage`] envelopes; the durable
//! task state (payload, status, retries) lives in the relational store.
//! Enqueue deduplicates on task id, delivery is at-least-once through a
//! consumer group, and failed deliveries move to a dead-letter stream.

pub mod error;
pub mod message;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use message::TaskMessage;
pub use queue::{QueueConfig, TaskQueue};
