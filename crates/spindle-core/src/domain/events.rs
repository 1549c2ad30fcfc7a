//! Events - キューのライフサイクルシグナル
//!
//! 観測用のイベントです。挙動には影響しません。
//! EventSink port に渡され、ログやチャネルに流されます。

use std::time::Duration;

use super::ids::{BatchId, TaskId};
use super::task::TaskIntent;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A task was persisted.
    TaskQueued {
        task_id: TaskId,
        intent: TaskIntent,
        room_id: String,
        event_id: String,
        sender: String,
        event_type: String,
    },

    /// A batch was closed and handed to the dispatcher.
    BatchFormed { batch_id: BatchId, size: usize },

    /// One delivery attempt failed; the same batch is sent again after `retry_in`.
    BatchRetrying {
        batch_id: BatchId,
        attempt: u32,
        retry_in: Duration,
        error: String,
    },

    /// The sink acknowledged the batch; its tasks are gone from the queue.
    BatchDelivered {
        batch_id: BatchId,
        size: usize,
        attempts: u32,
    },

    /// Retry budget exhausted; the batch's tasks were dropped.
    BatchAbandoned {
        batch_id: BatchId,
        size: usize,
        attempts: u32,
        error: String,
        dead_lettered: bool,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::TaskQueued { .. } => "task_queued",
            QueueEvent::BatchFormed { .. } => "batch_formed",
            QueueEvent::BatchRetrying { .. } => "batch_retrying",
            QueueEvent::BatchDelivered { .. } => "batch_delivered",
            QueueEvent::BatchAbandoned { .. } => "batch_failed",
        }
    }
}
