//! DurableQueue - 永続キューとバッチ配送ワーカー
//!
//! # フロー
//! 1. enqueue: filter → Task 作成 → TaskStore::insert → TaskQueued → worker を起こす
//! 2. worker: 未配送 Task を古い順に最大 batch_size 件読んで Batch を作る
//!    - batch_size 件たまったら即座に閉じる
//!    - 足りなければ flush_interval 待ってから閉じる
//! 3. BatchDispatcher で配送、失敗したら retry_delay 後に同じ Batch を丸ごと再送
//! 4. 成功 → Task 削除 / max_retries 回失敗 → 破棄（dead_letter 有効なら退避）
//!
//! 配送中の Batch は常に 1 つだけ。その間も enqueue は止まりません。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::config::QueueConfig;
use super::dispatcher::BatchDispatcher;
use super::retry::RetryPolicy;
use crate::domain::{Batch, QueueEvent, RawEvent, SpindleError, StoreError, Task, TaskId};
use crate::filter::is_indexable;
use crate::observability::QueueCounts;
use crate::ports::{Clock, DeadLetter, EventSink, IdGenerator, TaskStore};

#[derive(Debug, Default)]
struct Stats {
    in_flight: usize,
    delivered_batches: u64,
    abandoned_batches: u64,
    failed_attempts: u64,
}

struct Inner {
    config: QueueConfig,
    retry: RetryPolicy,
    store: Arc<dyn TaskStore>,
    dispatcher: BatchDispatcher,
    events: Arc<dyn EventSink>,
    id_gen: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    wake: Notify,
    worker_running: AtomicBool,
    stats: Mutex<Stats>,
}

impl Inner {
    fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to the queue. Cheap to clone; all clones share one store and worker.
#[derive(Clone)]
pub struct DurableQueue {
    inner: Arc<Inner>,
}

impl DurableQueue {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn TaskStore>,
        dispatcher: BatchDispatcher,
        events: Arc<dyn EventSink>,
        id_gen: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                retry,
                store,
                dispatcher,
                events,
                id_gen,
                clock,
                wake: Notify::new(),
                worker_running: AtomicBool::new(false),
                stats: Mutex::new(Stats::default()),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Persists the event as a Task if it is indexable.
    ///
    /// Returns once the Task is durable; delivery happens later on the worker.
    /// `Ok(None)` means the event was filtered out.
    pub async fn enqueue(&self, event: RawEvent) -> Result<Option<TaskId>, SpindleError> {
        if !is_indexable(&event) {
            debug!(event_id = %event.event_id, event_type = %event.event_type, "event not indexable");
            return Ok(None);
        }

        let inner = &self.inner;
        let task = Task::new(inner.id_gen.generate_task_id(), event, inner.clock.now());
        inner.store.insert(&task).await?;

        inner.events.emit(&QueueEvent::TaskQueued {
            task_id: task.id,
            intent: task.intent(),
            room_id: task.event.room_id.clone(),
            event_id: task.event.event_id.clone(),
            sender: task.event.sender.clone(),
            event_type: task.event.event_type.clone(),
        });
        inner.wake.notify_one();
        Ok(Some(task.id))
    }

    /// Snapshot of the queue. `pending` includes the tasks of the in-flight batch.
    pub async fn counts(&self) -> Result<QueueCounts, SpindleError> {
        let pending = self.inner.store.count_pending().await?;
        let stats = self.inner.stats();
        Ok(QueueCounts {
            pending,
            in_flight: stats.in_flight,
            delivered_batches: stats.delivered_batches,
            abandoned_batches: stats.abandoned_batches,
            failed_attempts: stats.failed_attempts,
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, SpindleError> {
        Ok(self.inner.store.dead_letters().await?)
    }

    /// Starts the single delivery worker.
    ///
    /// Fails if a worker of this queue is still running.
    pub fn spawn_worker(&self) -> Result<WorkerHandle, SpindleError> {
        if self.inner.worker_running.swap(true, Ordering::SeqCst) {
            return Err(SpindleError::WorkerAlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            worker_loop(&inner, shutdown_rx).await;
            inner.worker_running.store(false, Ordering::SeqCst);
        });
        Ok(WorkerHandle { shutdown_tx, join })
    }
}

/// Worker handle.
/// - `request_shutdown` は待機中（idle / retry wait）のワーカーを止める
/// - 配送中の HTTP 呼び出しは中断しない
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the worker may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the worker.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn worker_loop(inner: &Inner, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        batch_size = inner.config.batch_size,
        max_retries = inner.config.max_retries,
        "queue worker started"
    );

    let mut open_since = None;
    loop {
        let batch = match next_batch(inner, &mut shutdown_rx, open_since.take()).await {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read pending tasks");
                if wait_or_shutdown(&mut shutdown_rx, inner.config.retry_delay()).await {
                    break;
                }
                continue;
            }
        };

        // 配送中に来た Task の flush_interval は配送開始から数える
        open_since = Some(Instant::now());
        if !dispatch(inner, batch, &mut shutdown_rx).await {
            break;
        }
    }

    info!("queue worker stopped");
}

/// Waits until a batch can be closed. `None` on shutdown.
///
/// `open_since` is when the partial batch started waiting, if known.
async fn next_batch(
    inner: &Inner,
    shutdown_rx: &mut watch::Receiver<bool>,
    mut open_since: Option<Instant>,
) -> Result<Option<Batch>, StoreError> {
    let batch_size = inner.config.batch_size;

    loop {
        if *shutdown_rx.borrow() {
            return Ok(None);
        }

        let pending = inner.store.count_pending().await?;
        if pending >= batch_size {
            break;
        }

        let deadline = if pending > 0 {
            let deadline = *open_since.get_or_insert_with(Instant::now) + inner.config.flush_interval();
            if Instant::now() >= deadline {
                break;
            }
            Some(deadline)
        } else {
            open_since = None;
            None
        };

        tokio::select! {
            _ = inner.wake.notified() => {}
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return Ok(None);
                }
            }
        }
    }

    let tasks = inner.store.load_pending(batch_size).await?;
    let batch = Batch::new(inner.id_gen.generate_batch_id(), tasks);
    inner.events.emit(&QueueEvent::BatchFormed {
        batch_id: batch.id,
        size: batch.len(),
    });
    Ok(Some(batch))
}

/// Runs the retry state machine for one batch. `false` on shutdown.
async fn dispatch(inner: &Inner, mut batch: Batch, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    inner.stats().in_flight = batch.len();

    let keep_running = loop {
        batch.begin_attempt();

        let error = match inner.dispatcher.deliver(&batch).await {
            Ok(_ack) => {
                batch.mark_succeeded();
                finish_delivered(inner, &batch).await;
                break true;
            }
            Err(e) => e.to_string(),
        };
        inner.stats().failed_attempts += 1;

        if inner.retry.is_exhausted(batch.attempts) {
            batch.mark_abandoned(error);
            finish_abandoned(inner, &batch).await;
            break true;
        }

        let retry_in = inner.retry.next_delay(batch.attempts);
        inner.events.emit(&QueueEvent::BatchRetrying {
            batch_id: batch.id,
            attempt: batch.attempts,
            retry_in,
            error: error.clone(),
        });
        batch.schedule_retry(error);

        // Task は永続化済みなので、ここで止まっても次回起動時に再送される
        if wait_or_shutdown(shutdown_rx, retry_in).await {
            break false;
        }
    };

    inner.stats().in_flight = 0;
    keep_running
}

async fn finish_delivered(inner: &Inner, batch: &Batch) {
    if let Err(e) = inner.store.remove(&batch.task_ids()).await {
        // 残った Task は次の Batch で再送される（at-least-once）
        error!(batch_id = %batch.id, error = %e, "failed to remove delivered tasks");
    }
    inner.stats().delivered_batches += 1;
    inner.events.emit(&QueueEvent::BatchDelivered {
        batch_id: batch.id,
        size: batch.len(),
        attempts: batch.attempts,
    });
}

async fn finish_abandoned(inner: &Inner, batch: &Batch) {
    let dead_lettered = inner.config.dead_letter;
    let result = if dead_lettered {
        inner
            .store
            .dead_letter(
                batch.id,
                batch.tasks(),
                batch.attempts,
                batch.last_error.as_deref(),
                inner.clock.now(),
            )
            .await
    } else {
        inner.store.remove(&batch.task_ids()).await
    };
    if let Err(e) = result {
        error!(batch_id = %batch.id, error = %e, "failed to drop abandoned tasks");
    }

    inner.stats().abandoned_batches += 1;
    inner.events.emit(&QueueEvent::BatchAbandoned {
        batch_id: batch.id,
        size: batch.len(),
        attempts: batch.attempts,
        error: batch.last_error.clone().unwrap_or_default(),
        dead_lettered,
    });
}

/// Sleeps for `delay`. Returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}
