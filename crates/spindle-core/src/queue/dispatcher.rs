//! BatchDispatcher - 1 バッチを 1 回だけ配送する
//!
//! リトライの判断はしません（DurableQueue の worker が行う）。

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::{Batch, SinkError};
use crate::ports::{Ack, BatchSink};

#[derive(Clone)]
pub struct BatchDispatcher {
    sink: Arc<dyn BatchSink>,
}

impl BatchDispatcher {
    pub fn new(sink: Arc<dyn BatchSink>) -> Self {
        Self { sink }
    }

    /// Sends every event of the batch, in task order, in one sink call.
    pub async fn deliver(&self, batch: &Batch) -> Result<Ack, SinkError> {
        let events = batch.events();
        debug!(
            batch_id = %batch.id,
            size = events.len(),
            attempt = batch.attempts,
            "dispatching batch"
        );

        let started = Instant::now();
        let result = self.sink.deliver(&events).await;
        debug!(
            batch_id = %batch.id,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchId, RawEvent, Task, TaskId};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use ulid::Ulid;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn deliver(&self, events: &[&RawEvent]) -> Result<Ack, SinkError> {
            self.seen
                .lock()
                .unwrap()
                .push(events.iter().map(|e| e.event_id.clone()).collect());
            Ok(Ack { status: 200 })
        }
    }

    #[tokio::test]
    async fn delivers_whole_batch_in_task_order() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = BatchDispatcher::new(sink.clone());
        let tasks = ["$1", "$2", "$3"]
            .iter()
            .map(|id| {
                let event = RawEvent::new("!r", *id, "@a", "m.room.message").with_content("body", "x");
                Task::new(TaskId::from_ulid(Ulid::new()), event, Utc::now())
            })
            .collect();
        let batch = Batch::new(BatchId::from_ulid(Ulid::new()), tasks);

        let ack = dispatcher.deliver(&batch).await.unwrap();

        assert_eq!(ack.status, 200);
        assert_eq!(*sink.seen.lock().unwrap(), vec![vec!["$1", "$2", "$3"]]);
    }
}
