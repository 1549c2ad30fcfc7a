//! TaskStore port - 未解決 Task の正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - 配送待ちの Task（FIFO 順）
//! - 破棄された Task の dead letter（有効な場合のみ）
//!
//! # 実装
//! - SqliteTaskStore（本番用、プロセス再起動を跨いで残る）
//! - InMemoryTaskStore（テスト用）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{BatchId, RawEvent, StoreError, Task, TaskId};

/// A task dropped after its batch exhausted the retry budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub task_id: TaskId,
    pub batch_id: BatchId,
    pub event: RawEvent,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub abandoned_at: DateTime<Utc>,
}

/// TaskStore は未解決 Task の正本
///
/// # 設計原則
/// - 各メソッドは 1 トランザクション（途中でクラッシュしても中途半端な状態を残さない）
/// - insert が Ok を返した時点で Task は永続化済み
/// - load_pending は挿入順（FIFO）で返す
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    /// Oldest `limit` pending tasks, in insertion order.
    async fn load_pending(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    async fn count_pending(&self) -> Result<usize, StoreError>;

    /// Deletes the given tasks. Returns how many rows were removed.
    async fn remove(&self, ids: &[TaskId]) -> Result<usize, StoreError>;

    /// Moves the given tasks into dead-letter storage. Returns how many were moved.
    async fn dead_letter(
        &self,
        batch_id: BatchId,
        tasks: &[Task],
        attempts: u32,
        last_error: Option<&str>,
        abandoned_at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError>;
}
