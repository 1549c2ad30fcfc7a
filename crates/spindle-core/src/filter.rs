//! Indexability filter.
//!
//! Decides whether an event is worth sending to the indexer. Pure and total:
//! a missing field is a normal `false`, never an error.

use crate::domain::RawEvent;

/// Content keys the indexer can search on.
pub const INDEXABLE_CONTENT_KEYS: [&str; 3] = ["body", "name", "topic"];

/// `m.room.redaction`, or anything carrying a `redacts` target.
pub fn is_redaction(event: &RawEvent) -> bool {
    event.is_redaction()
}

/// True iff the event is not a redaction and carries at least one of
/// `content.body`, `content.name`, `content.topic`.
///
/// A key that is present with a JSON `null` value still counts as present.
pub fn is_indexable(event: &RawEvent) -> bool {
    if is_redaction(event) {
        return false;
    }
    INDEXABLE_CONTENT_KEYS
        .iter()
        .any(|key| event.content.contains_key(*key))
}
