//! Pipeline - 起動済みのキュー + ワーカー + 接続中のソース
//!
//! # Shutdown の順序
//! 1. ソースの subscription を cancel（新しい通知を止める）
//! 2. intake がチャネルに残った通知を enqueue し終えるのを待つ
//! 3. ワーカーを止める（配送中の呼び出しは最後まで待つ）
//!
//! 未配送の Task は永続化されているので、次回起動時に再送されます。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::intake::Intake;
use crate::domain::SpindleError;
use crate::observability::QueueCounts;
use crate::ports::{EventSource, Subscription};
use crate::queue::{DurableQueue, WorkerHandle};

/// Notifications buffered between a source and the intake.
pub const NOTIFICATION_BUFFER: usize = 1024;

struct AttachedSource {
    name: &'static str,
    subscription: Subscription,
    /// `None` once the intake was awaited to completion.
    intake: Option<JoinHandle<()>>,
}

pub struct Pipeline {
    queue: DurableQueue,
    worker: WorkerHandle,
    sources: Vec<AttachedSource>,
}

impl Pipeline {
    pub(crate) fn new(queue: DurableQueue, worker: WorkerHandle) -> Self {
        Self {
            queue,
            worker,
            sources: Vec::new(),
        }
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub async fn counts(&self) -> Result<QueueCounts, SpindleError> {
        self.queue.counts().await
    }

    /// Subscribes to `source` and feeds its notifications into the queue.
    pub fn attach(&mut self, source: &dyn EventSource) -> Result<(), SpindleError> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let subscription = source.subscribe(tx)?;
        let intake = tokio::spawn(Intake::new(self.queue.clone()).run(rx));

        info!(source = source.name(), "event source attached");
        self.sources.push(AttachedSource {
            name: source.name(),
            subscription,
            intake: Some(intake),
        });
        Ok(())
    }

    /// Waits until every attached source ended on its own and its
    /// notifications were enqueued. Cancel safe.
    pub async fn run_until_sources_end(&mut self) {
        for source in &mut self.sources {
            let Some(intake) = source.intake.as_mut() else {
                continue;
            };
            // intake は producer が tx を drop したら終わる
            if let Err(e) = intake.await {
                warn!(source = source.name, error = %e, "intake task failed");
            }
            source.intake = None;
            info!(source = source.name, "event source ended");
        }
    }

    /// Polls until no task is pending, i.e. everything enqueued so far was
    /// delivered or abandoned.
    pub async fn wait_until_drained(&self, poll: Duration) -> Result<(), SpindleError> {
        loop {
            if self.queue.counts().await?.pending == 0 {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub async fn shutdown(self) {
        for source in self.sources {
            source.subscription.cancel_and_join().await;
            if let Some(intake) = source.intake {
                if let Err(e) = intake.await {
                    warn!(source = source.name, error = %e, "intake task failed");
                }
            }
        }
        self.worker.shutdown_and_join().await;
        info!("pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::PipelineBuilder;
    use crate::domain::{QueueEvent, RawEvent, SinkError};
    use crate::impls::{ChannelEventSink, InMemoryTaskStore};
    use crate::ports::{Ack, BatchSink, SourceNotification};
    use crate::queue::QueueConfig;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn deliver(&self, events: &[&RawEvent]) -> Result<Ack, SinkError> {
            self.batches
                .lock()
                .unwrap()
                .push(events.iter().map(|e| e.event_id.clone()).collect());
            Ok(Ack { status: 200 })
        }
    }

    /// Emits a fixed list of notifications, then ends.
    struct VecSource(Vec<SourceNotification>);

    impl EventSource for VecSource {
        fn name(&self) -> &'static str {
            "vec"
        }

        fn subscribe(
            &self,
            tx: mpsc::Sender<SourceNotification>,
        ) -> Result<Subscription, SpindleError> {
            let items = self.0.clone();
            Ok(Subscription::spawn(move |_cancel| async move {
                for item in items {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            }))
        }
    }

    fn message(id: &str) -> RawEvent {
        RawEvent::new("!room", id, "@alice", "m.room.message").with_content("body", id)
    }

    #[tokio::test(start_paused = true)]
    async fn source_events_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let (events, mut rx) = ChannelEventSink::new();
        let mut pipeline = PipelineBuilder::new()
            .config(QueueConfig {
                batch_size: 2,
                ..QueueConfig::default()
            })
            .store(Arc::new(InMemoryTaskStore::new()))
            .sink(sink.clone())
            .event_sink(Arc::new(events))
            .build()
            .unwrap();

        let source = VecSource(vec![
            SourceNotification::Plaintext {
                event: message("$1"),
                encrypted: false,
            },
            SourceNotification::Plaintext {
                event: RawEvent::new("!room", "$r", "@alice", "m.room.redaction").with_redacts("$1"),
                encrypted: false,
            },
            SourceNotification::Decrypted(Ok(message("$2"))),
        ]);
        pipeline.attach(&source).unwrap();
        pipeline.run_until_sources_end().await;

        loop {
            if let QueueEvent::BatchDelivered { .. } = rx.recv().await.unwrap() {
                break;
            }
        }
        pipeline.wait_until_drained(Duration::from_millis(10)).await.unwrap();

        assert_eq!(*sink.batches.lock().unwrap(), vec![vec!["$1", "$2"]]);
        let counts = pipeline.counts().await.unwrap();
        assert_eq!(counts.delivered_batches, 1);

        pipeline.shutdown().await;
    }
}
