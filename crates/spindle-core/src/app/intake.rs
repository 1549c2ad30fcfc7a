//! Intake - 同期クライアントの通知をキューにつなぐ
//!
//! # ルール
//! - 暗号化されたままのイベント: 無視（復号後に Decrypted として届く）
//! - redaction: 無視
//! - 復号失敗: warn ログを出して捨てる（リトライしない）
//! - それ以外: DurableQueue::enqueue（filter はキュー側で行う）
//!
//! enqueue の失敗はログするだけで、取り込みは止めません。

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::TaskId;
use crate::filter::is_redaction;
use crate::ports::SourceNotification;
use crate::queue::DurableQueue;

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Queued(TaskId),
    NotIndexable,
    SkippedEncrypted,
    SkippedRedaction,
    DecryptionFailed,
    EnqueueFailed,
}

#[derive(Clone)]
pub struct Intake {
    queue: DurableQueue,
}

impl Intake {
    pub fn new(queue: DurableQueue) -> Self {
        Self { queue }
    }

    pub async fn handle(&self, notification: SourceNotification) -> IntakeOutcome {
        let event = match notification {
            SourceNotification::Plaintext {
                encrypted: true,
                event,
            } => {
                debug!(event_id = %event.event_id, "skipping encrypted event until decrypted");
                return IntakeOutcome::SkippedEncrypted;
            }
            SourceNotification::Plaintext { event, .. } => event,
            SourceNotification::Decrypted(Ok(event)) => event,
            SourceNotification::Decrypted(Err(failure)) => {
                warn!(
                    event_id = failure.event.get("event_id").and_then(|v| v.as_str()).unwrap_or(""),
                    room_id = failure.event.get("room_id").and_then(|v| v.as_str()).unwrap_or(""),
                    reason = %failure.reason,
                    "decryption failure"
                );
                return IntakeOutcome::DecryptionFailed;
            }
        };

        if is_redaction(&event) {
            debug!(event_id = %event.event_id, redacts = ?event.redacts, "skipping redaction");
            return IntakeOutcome::SkippedRedaction;
        }

        let event_id = event.event_id.clone();
        match self.queue.enqueue(event).await {
            Ok(Some(task_id)) => IntakeOutcome::Queued(task_id),
            Ok(None) => IntakeOutcome::NotIndexable,
            Err(e) => {
                error!(event_id = %event_id, error = %e, "failed to enqueue event");
                IntakeOutcome::EnqueueFailed
            }
        }
    }

    /// Handles notifications until every sender is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<SourceNotification>) {
        let mut handled: u64 = 0;
        while let Some(notification) = rx.recv().await {
            self.handle(notification).await;
            handled += 1;
        }
        info!(handled, "intake finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawEvent, SinkError};
    use crate::impls::{InMemoryTaskStore, TracingEventSink};
    use crate::ports::{Ack, BatchSink, DecryptionFailure, SystemClock, TaskStore, UlidGenerator};
    use crate::queue::{BatchDispatcher, QueueConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct NullSink;

    #[async_trait]
    impl BatchSink for NullSink {
        async fn deliver(&self, _events: &[&RawEvent]) -> Result<Ack, SinkError> {
            Ok(Ack { status: 200 })
        }
    }

    fn intake() -> (Intake, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = DurableQueue::new(
            QueueConfig::default(),
            store.clone(),
            BatchDispatcher::new(Arc::new(NullSink)),
            Arc::new(TracingEventSink),
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
        );
        (Intake::new(queue), store)
    }

    fn message(id: &str) -> RawEvent {
        RawEvent::new("!room", id, "@alice", "m.room.message").with_content("body", "hello")
    }

    #[tokio::test]
    async fn plaintext_message_is_queued() {
        let (intake, store) = intake();

        let outcome = intake
            .handle(SourceNotification::Plaintext {
                event: message("$1"),
                encrypted: false,
            })
            .await;

        assert!(matches!(outcome, IntakeOutcome::Queued(_)));
        assert_eq!(store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn encrypted_event_is_skipped_then_queued_once_decrypted() {
        let (intake, store) = intake();

        let skipped = intake
            .handle(SourceNotification::Plaintext {
                event: RawEvent::new("!room", "$1", "@alice", "m.room.encrypted"),
                encrypted: true,
            })
            .await;
        let queued = intake
            .handle(SourceNotification::Decrypted(Ok(message("$1"))))
            .await;

        assert_eq!(skipped, IntakeOutcome::SkippedEncrypted);
        assert!(matches!(queued, IntakeOutcome::Queued(_)));
        assert_eq!(store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn redaction_is_never_queued() {
        let (intake, store) = intake();
        let redaction = RawEvent::new("!room", "$r", "@alice", "m.room.redaction")
            .with_redacts("$1")
            .with_content("reason", "spam");

        let outcome = intake
            .handle(SourceNotification::Plaintext {
                event: redaction,
                encrypted: false,
            })
            .await;

        assert_eq!(outcome, IntakeOutcome::SkippedRedaction);
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decryption_failure_is_dropped() {
        let (intake, store) = intake();

        let outcome = intake
            .handle(SourceNotification::Decrypted(Err(DecryptionFailure {
                event: json!({"event_id": "$x", "type": "m.room.encrypted"}),
                reason: "missing keys".to_string(),
            })))
            .await;

        assert_eq!(outcome, IntakeOutcome::DecryptionFailed);
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn membership_event_is_not_indexable() {
        let (intake, _store) = intake();
        let member = RawEvent::new("!room", "$m", "@alice", "m.room.member")
            .with_content("membership", "join");

        let outcome = intake
            .handle(SourceNotification::Plaintext {
                event: member,
                encrypted: false,
            })
            .await;

        assert_eq!(outcome, IntakeOutcome::NotIndexable);
    }

    #[tokio::test]
    async fn run_ends_when_senders_are_gone() {
        let (intake, store) = intake();
        let (tx, rx) = mpsc::channel(4);
        let join = tokio::spawn(intake.run(rx));

        tx.send(SourceNotification::Decrypted(Ok(message("$1")))).await.unwrap();
        tx.send(SourceNotification::Decrypted(Ok(message("$2")))).await.unwrap();
        drop(tx);
        join.await.unwrap();

        assert_eq!(store.count_pending().await.unwrap(), 2);
    }
}
