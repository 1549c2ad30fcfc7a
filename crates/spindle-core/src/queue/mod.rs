//! Queue - 永続キュー本体
//!
//! - `DurableQueue`: enqueue と配送ワーカー
//! - `BatchDispatcher`: 1 バッチ 1 回の配送
//! - `RetryPolicy`: 固定間隔のリトライ判定

pub mod config;
pub mod dispatcher;
pub mod durable;
pub mod retry;

pub use self::config::QueueConfig;
pub use self::dispatcher::BatchDispatcher;
pub use self::durable::{DurableQueue, WorkerHandle};
pub use self::retry::RetryPolicy;
