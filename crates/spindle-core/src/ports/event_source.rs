//! EventSource port - 同期クライアントからのイベント通知
//!
//! 同期クライアント（ログイン・復号・sync プロトコル）は外部コラボレータです。
//! core は subscribe して通知を受け取り、shutdown 時に cancel します。
//!
//! # 通知の種類
//! - Plaintext: 復号不要、または復号前のイベント（encrypted なら無視する）
//! - Decrypted: 非同期の復号が終わったイベント（失敗ならログして捨てる）

use std::future::Future;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::{RawEvent, SpindleError};

/// Marker for an event the sync client could not decrypt.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptionFailure {
    /// The still-encrypted event as received, for logging only.
    pub event: Value,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceNotification {
    Plaintext { event: RawEvent, encrypted: bool },
    Decrypted(Result<RawEvent, DecryptionFailure>),
}

/// Handle to a running subscription.
///
/// Dropping the handle does not stop the subscription; call `cancel`.
pub struct Subscription {
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Subscription {
    /// Spawns the producer future. It receives a cancel flag it must watch.
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let join = tokio::spawn(producer(cancel_rx));
        Self { cancel_tx, join }
    }

    pub fn cancel(&self) {
        // ignore send error: the producer may already be gone
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits until the producer ends on its own (e.g. end of input).
    pub async fn join(self) {
        let _ = self.join.await;
    }

    pub async fn cancel_and_join(self) {
        self.cancel();
        self.join().await;
    }
}

/// EventSource は通知を `tx` に流し続ける
///
/// `tx` が閉じられたら（受け手が止まったら）producer も終了すること。
pub trait EventSource: Send + Sync {
    /// Human-readable name (used in logs).
    fn name(&self) -> &'static str;

    fn subscribe(&self, tx: mpsc::Sender<SourceNotification>)
    -> Result<Subscription, SpindleError>;
}
