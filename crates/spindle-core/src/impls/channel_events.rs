//! ChannelEventSink - シグナルを tokio のチャネルに流す
//!
//! 埋め込み側やテストがライフサイクルを観測するために使います。

use tokio::sync::mpsc;

use crate::domain::QueueEvent;
use crate::ports::EventSink;

pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &QueueEvent) {
        // 受け手がいなくなっても配送は続ける
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BatchId;
    use ulid::Ulid;

    #[test]
    fn forwards_events_and_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelEventSink::new();
        let event = QueueEvent::BatchFormed {
            batch_id: BatchId::from_ulid(Ulid::new()),
            size: 3,
        };

        sink.emit(&event);
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        sink.emit(&event);
    }
}
