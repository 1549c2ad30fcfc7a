//! Batch state machine.

use serde::{Deserialize, Serialize};

use super::event::RawEvent;
use super::ids::{BatchId, TaskId};
use super::task::Task;

/// Batch state.
///
/// State transitions:
/// - Open -> Dispatching -> Succeeded
/// - Open -> Dispatching -> Retrying -> Dispatching (loop until max_retries)
/// - Open -> Dispatching -> Abandoned (when max_retries exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Formed from persisted tasks, not sent yet.
    Open,

    /// A delivery attempt is in flight.
    Dispatching,

    /// Last attempt failed, waiting for retry_delay.
    Retrying,

    /// Sink acknowledged the batch.
    Succeeded,

    /// Retry budget exhausted; tasks dropped from the queue.
    Abandoned,
}

impl BatchState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Succeeded | BatchState::Abandoned)
    }
}

/// An ordered group of tasks delivered together.
///
/// Never persisted itself: each formation reads the oldest pending tasks again.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    tasks: Vec<Task>,
    pub state: BatchState,

    /// Delivery attempts made so far (including the current one while Dispatching).
    pub attempts: u32,

    pub last_error: Option<String>,
}

impl Batch {
    pub fn new(id: BatchId, tasks: Vec<Task>) -> Self {
        Self {
            id,
            tasks,
            state: BatchState::Open,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    /// Events in task order, as they go on the wire.
    pub fn events(&self) -> Vec<&RawEvent> {
        self.tasks.iter().map(|t| &t.event).collect()
    }

    pub fn begin_attempt(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = BatchState::Dispatching;
        self.attempts += 1;
    }

    pub fn mark_succeeded(&mut self) {
        self.state = BatchState::Succeeded;
    }

    pub fn schedule_retry(&mut self, error: String) {
        self.state = BatchState::Retrying;
        self.last_error = Some(error);
    }

    pub fn mark_abandoned(&mut self, error: String) {
        self.state = BatchState::Abandoned;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn task(body: &str) -> Task {
        let event = RawEvent::new("!r", format!("${body}"), "@a", "m.room.message")
            .with_content("body", body);
        Task::new(TaskId::from_ulid(Ulid::new()), event, Utc::now())
    }

    #[test]
    fn retry_cycle_ends_in_success() {
        let mut batch = Batch::new(BatchId::from_ulid(Ulid::new()), vec![task("a"), task("b")]);
        assert_eq!(batch.state, BatchState::Open);

        batch.begin_attempt();
        batch.schedule_retry("HTTP 503".to_string());
        assert_eq!(batch.state, BatchState::Retrying);
        assert!(!batch.state.is_terminal());

        batch.begin_attempt();
        batch.mark_succeeded();
        assert_eq!(batch.attempts, 2);
        assert!(batch.state.is_terminal());
        assert_eq!(batch.last_error.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn events_keep_task_order() {
        let batch = Batch::new(
            BatchId::from_ulid(Ulid::new()),
            vec![task("one"), task("two"), task("three")],
        );
        let bodies: Vec<_> = batch
            .events()
            .iter()
            .map(|e| e.content["body"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);
    }
}
