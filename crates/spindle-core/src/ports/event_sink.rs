//! EventSink port - ライフサイクルシグナルの受け口
//!
//! # 実装
//! - TracingEventSink: tracing のログに変換（本番用）
//! - ChannelEventSink: tokio のチャネルに流す（埋め込み・テスト用）

use crate::domain::QueueEvent;

/// EventSink はキューのライフサイクルシグナルを記録
///
/// emit はキューのホットパスから同期的に呼ばれるので、ブロックしないこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &QueueEvent);
}
