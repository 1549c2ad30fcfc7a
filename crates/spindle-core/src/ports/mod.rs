//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（SQLite, 配送先の HTTP API, 同期クライアント）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - SQLite が未解決 Task の正本
//! - 配送先は all-or-nothing の bulk API
//! - 同期クライアントは subscribe / cancel だけで扱う

pub mod clock;
pub mod event_sink;
pub mod event_source;
pub mod id_generator;
pub mod sink;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::event_source::{DecryptionFailure, EventSource, SourceNotification, Subscription};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::sink::{Ack, BatchSink};
pub use self::task_store::{DeadLetter, TaskStore};
