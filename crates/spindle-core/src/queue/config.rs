use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue tuning knobs. Every field has a default, so a partial TOML table works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max tasks per delivery call.
    pub batch_size: usize,

    /// Total delivery attempts per batch before it is abandoned.
    pub max_retries: u32,

    /// Fixed wait between attempts.
    pub retry_delay_ms: u64,

    /// How long a partial batch stays open before it is sent anyway.
    pub flush_interval_ms: u64,

    /// Keep abandoned tasks in the dead-letter table instead of dropping them.
    pub dead_letter: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 100,
            retry_delay_ms: 5000,
            flush_interval_ms: 2000,
            dead_letter: false,
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 100);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.flush_interval(), Duration::from_secs(2));
        assert!(!config.dead_letter);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 100);
    }
}
