//! RawEvent: a decoded change event as handed over by the sync client.
//!
//! The queue never interprets the content. Fields the queue does not know
//! about are kept in `extra` and written back unchanged, so the sink receives
//! the event exactly as it was received.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type of a redaction.
pub const REDACTION_EVENT_TYPE: &str = "m.room.redaction";

/// Missing identity fields decode as empty strings and are left out again on
/// encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub event_type: String,

    #[serde(default)]
    pub content: Map<String, Value>,

    /// Set when this event redacts another event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,

    /// Everything else (origin_server_ts, unsigned, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    pub fn new(
        room_id: impl Into<String>,
        event_id: impl Into<String>,
        sender: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            event_id: event_id.into(),
            sender: sender.into(),
            event_type: event_type.into(),
            content: Map::new(),
            redacts: None,
            extra: Map::new(),
        }
    }

    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_redacts(mut self, target: impl Into<String>) -> Self {
        self.redacts = Some(target.into());
        self
    }

    pub fn is_redaction(&self) -> bool {
        self.redacts.is_some() || self.event_type == REDACTION_EVENT_TYPE
    }
}
