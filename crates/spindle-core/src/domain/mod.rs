//! Domain model (ids, events, tasks, batches, errors, lifecycle signals).

pub mod batch;
pub mod errors;
pub mod event;
pub mod events;
pub mod ids;
pub mod task;

pub use self::batch::{Batch, BatchState};
pub use self::errors::{SinkError, SpindleError, StoreError};
pub use self::event::{RawEvent, REDACTION_EVENT_TYPE};
pub use self::events::QueueEvent;
pub use self::ids::{BatchId, TaskId};
pub use self::task::{Task, TaskIntent};
