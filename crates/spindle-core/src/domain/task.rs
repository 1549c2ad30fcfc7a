//! Task: one queued event plus its queue-assigned identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::RawEvent;
use super::ids::TaskId;

/// Why an event was queued. Only affects the `task queued` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskIntent {
    Index,
    Redaction,
}

impl TaskIntent {
    pub fn of(event: &RawEvent) -> Self {
        if event.redacts.is_some() {
            TaskIntent::Redaction
        } else {
            TaskIntent::Index
        }
    }
}

/// A queued event.
///
/// Owned by the queue from creation until its batch is delivered or abandoned.
/// The attempt count lives on the batch, not here; it is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub event: RawEvent,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, event: RawEvent, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            event,
            enqueued_at,
        }
    }

    pub fn intent(&self) -> TaskIntent {
        TaskIntent::of(&self.event)
    }
}
