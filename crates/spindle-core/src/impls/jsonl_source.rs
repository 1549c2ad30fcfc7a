//! JsonLinesSource - JSONL で通知を受け取る EventSource
//!
//! 同期クライアントは別プロセスで動き、1 行 1 通知の JSON を
//! stdin・ファイル・パイプに書き出す想定です。
//!
//! ```text
//! {"kind":"event","encrypted":false,"event":{...}}
//! {"kind":"decrypted","event":{...}}
//! {"kind":"decryption_failure","event":{...},"reason":"..."}
//! ```
//!
//! 壊れた行はログして読み飛ばします。

use std::io::ErrorKind;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::domain::{RawEvent, SpindleError};
use crate::ports::{DecryptionFailure, EventSource, SourceNotification, Subscription};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SourceLine {
    Event {
        #[serde(default)]
        encrypted: bool,
        event: RawEvent,
    },
    Decrypted {
        event: RawEvent,
    },
    DecryptionFailure {
        event: Value,
        #[serde(default)]
        reason: String,
    },
}

impl From<SourceLine> for SourceNotification {
    fn from(line: SourceLine) -> Self {
        match line {
            SourceLine::Event { encrypted, event } => {
                SourceNotification::Plaintext { event, encrypted }
            }
            SourceLine::Decrypted { event } => SourceNotification::Decrypted(Ok(event)),
            SourceLine::DecryptionFailure { event, reason } => {
                SourceNotification::Decrypted(Err(DecryptionFailure { event, reason }))
            }
        }
    }
}

fn parse_line(line: &str) -> Result<SourceNotification, serde_json::Error> {
    serde_json::from_str::<SourceLine>(line).map(SourceNotification::from)
}

/// One-shot source: the reader is consumed by the first `subscribe`.
pub struct JsonLinesSource<R> {
    reader: Mutex<Option<R>>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
        }
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> EventSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn subscribe(
        &self,
        tx: mpsc::Sender<SourceNotification>,
    ) -> Result<Subscription, SpindleError> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SpindleError::Source("jsonl source already subscribed".to_string()))?;

        Ok(Subscription::spawn(move |mut cancel_rx| async move {
            let mut lines = reader.lines();
            let mut line_no: u64 = 0;

            loop {
                if *cancel_rx.borrow() {
                    debug!("jsonl source cancelled");
                    break;
                }

                let next = tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    next = lines.next_line() => next,
                };

                let line = match next {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!(lines = line_no, "jsonl source reached end of input");
                        break;
                    }
                    // 不正な UTF-8 の行は消費済みなので読み続けられる
                    Err(e) if e.kind() == ErrorKind::InvalidData => {
                        line_no += 1;
                        warn!(line = line_no, error = %e, "skipping unreadable line");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "jsonl source read failed");
                        break;
                    }
                };
                line_no += 1;

                if line.trim().is_empty() {
                    continue;
                }

                match parse_line(&line) {
                    Ok(notification) => {
                        if tx.send(notification).await.is_err() {
                            debug!("notification receiver closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(line = line_no, error = %e, "skipping malformed notification");
                    }
                }
            }
        }))
    }
}
