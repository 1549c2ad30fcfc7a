//! TracingEventSink - シグナルを tracing のログに変換

use tracing::{debug, error, info, warn};

use crate::domain::{QueueEvent, TaskIntent};
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &QueueEvent) {
        match event {
            QueueEvent::TaskQueued {
                task_id,
                intent,
                room_id,
                event_id,
                sender,
                event_type,
            } => {
                let message = match intent {
                    TaskIntent::Index => "enqueue event for indexing",
                    TaskIntent::Redaction => "enqueue event for redaction",
                };
                info!(
                    task_id = %task_id,
                    room_id = %room_id,
                    event_id = %event_id,
                    sender = %sender,
                    event_type = %event_type,
                    "{message}"
                );
            }
            QueueEvent::BatchFormed { batch_id, size } => {
                debug!(batch_id = %batch_id, size, "batch formed");
            }
            QueueEvent::BatchRetrying {
                batch_id,
                attempt,
                retry_in,
                error,
            } => {
                warn!(
                    batch_id = %batch_id,
                    attempt,
                    retry_in_ms = retry_in.as_millis() as u64,
                    error = %error,
                    "batch attempt failed, retrying"
                );
            }
            QueueEvent::BatchDelivered {
                batch_id,
                size,
                attempts,
            } => {
                info!(batch_id = %batch_id, size, attempts, "batch delivered");
            }
            QueueEvent::BatchAbandoned {
                batch_id,
                size,
                attempts,
                error,
                dead_lettered,
            } => {
                error!(
                    batch_id = %batch_id,
                    size,
                    attempts,
                    dead_lettered,
                    error = %error,
                    "batch failed"
                );
            }
        }
    }
}
