//! spindle-core
//!
//! Durable event-delivery pipeline: chat events in, indexer batches out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event, task, batch, errors, events）
//! - **filter**: インデックス対象かどうかの判定
//! - **ports**: 抽象化レイヤー（TaskStore, BatchSink, EventSource, EventSink, Clock, IdGenerator）
//! - **queue**: 永続キュー・バッチ形成・リトライ
//! - **impls**: 実装（SQLite, HTTP, JSONL, tracing, in-memory）
//! - **app**: ワイヤリング（builder, intake, pipeline）
//!
//! # 配送の保証
//! - Task は受理された時点で永続化され、配送成功か破棄まで残る
//! - 配送中のバッチは常に 1 つ、バッチ間・バッチ内の順序は受理順
//! - at-least-once（同じバッチが再送されうるので、配送先は冪等であること）

pub mod app;
pub mod domain;
pub mod filter;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use crate::app::{BuildError, Pipeline, PipelineBuilder};
pub use crate::domain::{RawEvent, SpindleError};
pub use crate::queue::{DurableQueue, QueueConfig};
