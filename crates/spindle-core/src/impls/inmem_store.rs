//! InMemoryTaskStore - テスト・開発用の TaskStore
//!
//! プロセスが落ちると消えます。再起動のシミュレーションは
//! 同じ `Arc<InMemoryTaskStore>` を新しいキューに渡すことで行います。

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BatchId, StoreError, Task, TaskId};
use crate::ports::{DeadLetter, TaskStore};

#[derive(Default)]
struct State {
    /// Insertion sequence, never reused.
    next_seq: u64,
    pending: BTreeMap<u64, Task>,
    dead: Vec<DeadLetter>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<State>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.pending.values().any(|t| t.id == task.id) {
            return Err(StoreError::Corrupt(format!("duplicate task id {}", task.id)));
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.pending.insert(seq, task.clone());
        Ok(())
    }

    async fn load_pending(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let state = self.lock();
        Ok(state.pending.values().take(limit).cloned().collect())
    }

    async fn count_pending(&self) -> Result<usize, StoreError> {
        Ok(self.lock().pending.len())
    }

    async fn remove(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let before = state.pending.len();
        state.pending.retain(|_, task| !ids.contains(&task.id));
        Ok(before - state.pending.len())
    }

    async fn dead_letter(
        &self,
        batch_id: BatchId,
        tasks: &[Task],
        attempts: u32,
        last_error: Option<&str>,
        abandoned_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let mut moved = 0;
        for task in tasks {
            let seq = state
                .pending
                .iter()
                .find(|(_, t)| t.id == task.id)
                .map(|(seq, _)| *seq);
            let Some(seq) = seq else { continue };
            state.pending.remove(&seq);
            state.dead.push(DeadLetter {
                task_id: task.id,
                batch_id,
                event: task.event.clone(),
                enqueued_at: task.enqueued_at,
                attempts,
                last_error: last_error.map(str::to_string),
                abandoned_at,
            });
            moved += 1;
        }
        Ok(moved)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        Ok(self.lock().dead.clone())
    }
}
