//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store / sink が無ければ build() が BuildError を返す
//! - batch_size / max_retries が 0 なら build() が BuildError を返す
//! - 起動後に設定ミスで落ちることはありません

use std::sync::Arc;

use super::pipeline::Pipeline;
use crate::domain::SpindleError;
use crate::impls::TracingEventSink;
use crate::ports::{BatchSink, Clock, EventSink, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::queue::{BatchDispatcher, DurableQueue, QueueConfig};

/// PipelineBuilder はキューと配送ワーカーを組み立てる
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .config(QueueConfig::default())
///     .store(Arc::new(SqliteTaskStore::open("./store/queue.sqlite3")?))
///     .sink(Arc::new(HttpSink::new(&SinkConfig::default())?))
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: QueueConfig,
    store: Option<Arc<dyn TaskStore>>,
    sink: Option<Arc<dyn BatchSink>>,
    event_sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    id_gen: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はパイプライン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured")]
    MissingStore,

    #[error("no batch sink configured")]
    MissingSink,

    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Spindle(#[from] SpindleError),
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to [`TracingEventSink`].
    pub fn event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(event_sink);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the configured clock.
    pub fn id_generator(mut self, id_gen: Arc<dyn IdGenerator>) -> Self {
        self.id_gen = Some(id_gen);
        self
    }

    /// Wires the queue without starting anything.
    pub fn build_queue(self) -> Result<DurableQueue, BuildError> {
        validate(&self.config)?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let sink = self.sink.ok_or(BuildError::MissingSink)?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let id_gen: Arc<dyn IdGenerator> = match self.id_gen {
            Some(id_gen) => id_gen,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };
        let event_sink: Arc<dyn EventSink> = match self.event_sink {
            Some(event_sink) => event_sink,
            None => Arc::new(TracingEventSink),
        };

        Ok(DurableQueue::new(
            self.config,
            store,
            BatchDispatcher::new(sink),
            event_sink,
            id_gen,
            clock,
        ))
    }

    /// Wires the queue and starts its worker. Must run inside a tokio runtime.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let queue = self.build_queue()?;
        let worker = queue.spawn_worker()?;
        Ok(Pipeline::new(queue, worker))
    }
}

fn validate(config: &QueueConfig) -> Result<(), BuildError> {
    if config.batch_size == 0 {
        return Err(BuildError::InvalidConfig("batch_size must be at least 1".to_string()));
    }
    if config.max_retries == 0 {
        return Err(BuildError::InvalidConfig("max_retries must be at least 1".to_string()));
    }
    Ok(())
}
