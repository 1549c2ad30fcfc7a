//! Implementations - ポートの具体的な実装

pub mod channel_events;
pub mod http_sink;
pub mod inmem_store;
pub mod jsonl_source;
pub mod sqlite_store;
pub mod tracing_events;

pub use self::channel_events::ChannelEventSink;
pub use self::http_sink::{HttpSink, SinkConfig};
pub use self::inmem_store::InMemoryTaskStore;
pub use self::jsonl_source::JsonLinesSource;
pub use self::sqlite_store::SqliteTaskStore;
pub use self::tracing_events::TracingEventSink;
