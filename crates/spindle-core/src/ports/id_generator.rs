//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース。同一プロセス内で単調増加を保証します。

use std::sync::Mutex;

use ulid::Ulid;

use crate::domain::ids::{BatchId, TaskId};
use crate::ports::Clock;

/// IdGenerator は Task / Batch の ID を生成
///
/// # 保証
/// - 同一プロセス内では単調増加（Task の FIFO 順と一致する）
/// - 再利用しない
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_batch_id(&self) -> BatchId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// 同じミリ秒内や時計の巻き戻りでは、直前の ULID を increment して単調性を保ちます。
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Ulid>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(Ulid::nil()),
        }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let candidate = Ulid::from_parts(timestamp_ms, rand::random());

        // poisoned でも中身の Ulid は壊れていないのでそのまま使う
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = if candidate > *last {
            candidate
        } else {
            // random 部分が溢れるのは 2^80 回目なので実質起きない
            last.increment().unwrap_or(candidate)
        };
        *last = next;
        next
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_batch_id(&self) -> BatchId {
        BatchId::from(self.next_ulid())
    }
}
