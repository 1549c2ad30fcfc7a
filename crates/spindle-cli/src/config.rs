//! 設定の読み込み: TOML ファイル → CLI フラグ / SPINDLE_* 環境変数で上書き

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use spindle_core::QueueConfig;
use spindle_core::impls::SinkConfig;

/// SQLite file name inside the store directory.
pub const DB_FILE_NAME: &str = "queue.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./store"),
        }
    }
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE_NAME)
    }
}

/// Whole-process settings, one TOML table per section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue: QueueConfig,
    pub sink: SinkConfig,
    pub store: StoreConfig,
}

impl Settings {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Flags shared by every subcommand. Set flags win over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// TOML config file
    #[arg(long, short, env = "SPINDLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the queue database
    #[arg(long, env = "SPINDLE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Indexer API base URL (events are posted to <url>enqueue)
    #[arg(long, env = "SPINDLE_SINK_URL")]
    pub sink_url: Option<String>,

    /// Sink request timeout in seconds
    #[arg(long, env = "SPINDLE_SINK_TIMEOUT_SECS")]
    pub sink_timeout_secs: Option<u64>,

    /// Max events per delivery
    #[arg(long, env = "SPINDLE_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Delivery attempts per batch before it is abandoned
    #[arg(long, env = "SPINDLE_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Wait between delivery attempts (ms)
    #[arg(long, env = "SPINDLE_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// How long a partial batch waits before it is sent (ms)
    #[arg(long, env = "SPINDLE_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    /// Keep abandoned events in the dead-letter table
    #[arg(long, env = "SPINDLE_DEAD_LETTER")]
    pub dead_letter: bool,
}

impl SettingsArgs {
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.store_dir {
            settings.store.dir = dir.clone();
        }
        if let Some(url) = &self.sink_url {
            settings.sink.base_url = url.clone();
        }
        if let Some(secs) = self.sink_timeout_secs {
            settings.sink.timeout_secs = secs;
        }
        if let Some(n) = self.batch_size {
            settings.queue.batch_size = n;
        }
        if let Some(n) = self.max_retries {
            settings.queue.max_retries = n;
        }
        if let Some(ms) = self.retry_delay_ms {
            settings.queue.retry_delay_ms = ms;
        }
        if let Some(ms) = self.flush_interval_ms {
            settings.queue.flush_interval_ms = ms;
        }
        if self.dead_letter {
            settings.queue.dead_letter = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_means_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.store.db_path(), PathBuf::from("./store/queue.sqlite3"));
        assert_eq!(settings.sink.base_url, "http://localhost:8000/api/");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spindle.toml");
        std::fs::write(
            &path,
            r#"
[queue]
batch_size = 25
dead_letter = true

[sink]
base_url = "http://indexer:9000/api/"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.queue.batch_size, 25);
        assert!(settings.queue.dead_letter);
        assert_eq!(settings.queue.max_retries, 100);
        assert_eq!(settings.sink.base_url, "http://indexer:9000/api/");
        assert_eq!(settings.sink.timeout_secs, 30);
        assert_eq!(settings.store, StoreConfig::default());
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spindle.toml");
        std::fs::write(&path, "[queue]\nbatch_size = \"many\"\n").unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn flags_override_file_values() {
        let args = SettingsArgs {
            store_dir: Some(PathBuf::from("/var/lib/spindle")),
            sink_url: Some("http://other/api/".to_string()),
            batch_size: Some(7),
            retry_delay_ms: Some(10),
            dead_letter: true,
            ..SettingsArgs::default()
        };
        let mut settings = Settings::default();

        args.apply(&mut settings);

        assert_eq!(settings.store.db_path(), PathBuf::from("/var/lib/spindle/queue.sqlite3"));
        assert_eq!(settings.sink.base_url, "http://other/api/");
        assert_eq!(settings.queue.batch_size, 7);
        assert_eq!(settings.queue.retry_delay_ms, 10);
        assert_eq!(settings.queue.max_retries, 100);
        assert!(settings.queue.dead_letter);
    }
}
