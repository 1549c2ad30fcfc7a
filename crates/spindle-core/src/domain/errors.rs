//! Errors - エラー型
//!
//! 層ごとに enum を分けています。
//! - StoreError: 永続化（SQLite）の失敗
//! - SinkError: 配送先への送信失敗（すべてリトライ対象として同じ扱い）
//! - SpindleError: core 全体のエラー

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store task panicked or was cancelled: {0}")]
    Join(String),
}

/// A failed delivery attempt.
///
/// The queue does not distinguish transient from permanent failures; every
/// variant consumes one attempt.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected batch: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid sink url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SpindleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("event source error: {0}")]
    Source(String),

    #[error("a queue worker is already running")]
    WorkerAlreadyRunning,
}
