//! BatchSink port - 配送先（インデクサ）
//!
//! # 実装
//! - HttpSink: `POST {base_url}enqueue` に JSON 配列を送る

use async_trait::async_trait;

use crate::domain::{RawEvent, SinkError};

/// Positive acknowledgement of a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

/// BatchSink は 1 回の呼び出しで 1 バッチを配送
///
/// # 設計原則
/// - all-or-nothing: 成功なら全件受理、失敗なら全件やり直し
/// - 部分成功は解釈しない（冪等性は配送先の責務）
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, events: &[&RawEvent]) -> Result<Ack, SinkError>;
}
