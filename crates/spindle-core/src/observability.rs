use serde::{Deserialize, Serialize};

/// Point-in-time view of the queue.
///
/// `pending` is read from the store; the batch counters live in memory and
/// restart from zero with the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub delivered_batches: u64,
    pub abandoned_batches: u64,
    pub failed_attempts: u64,
}
