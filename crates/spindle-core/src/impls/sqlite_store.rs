//! SqliteTaskStore - SQLite による TaskStore
//!
//! SQLite is the only durable state. The worker's in-memory batch is rebuilt
//! from the `tasks` table after a crash.
//!
//! - `tasks.seq` is `AUTOINCREMENT`: never reused, gives FIFO order across restarts
//! - every mutation is one transaction
//! - rusqlite is blocking, so calls run on the blocking pool

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::domain::{BatchId, RawEvent, StoreError, Task, TaskId};
use crate::ports::{DeadLetter, TaskStore};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Opens (or creates) the database file and migrates the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened task store");
        Self::from_connection(conn)
    }

    /// Creates an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // in-memory DB は "memory" を返すので値はチェックしない
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1_queue_tables(conn)?;
    }

    debug!(current_version, target_version = CURRENT_VERSION, "Task store schema ready");
    Ok(())
}

/// V1: pending tasks + dead letters.
fn migrate_v1_queue_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS tasks (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL UNIQUE,
            event TEXT NOT NULL,
            enqueued_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS dead_letters (
            task_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            event TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            last_error TEXT,
            abandoned_at TEXT NOT NULL
        );
        INSERT INTO migrations (version, name) VALUES (1, 'queue_tables');
        COMMIT;",
    )?;
    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_task_id(raw: &str) -> Result<TaskId, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("bad task id {raw:?}: {e}")))
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let task_id = task.id.as_ulid().to_string();
        let event = serde_json::to_string(&task.event)?;
        let enqueued_at = task.enqueued_at.to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (task_id, event, enqueued_at) VALUES (?1, ?2, ?3)",
                params![task_id, event, enqueued_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_pending(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<(String, String, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT task_id, event, enqueued_at FROM tasks ORDER BY seq LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for (task_id, event, enqueued_at) in rows {
            let event: RawEvent = serde_json::from_str(&event)?;
            tasks.push(Task::new(
                parse_task_id(&task_id)?,
                event,
                parse_time(&enqueued_at)?,
            ));
        }
        Ok(tasks)
    }

    async fn count_pending(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn remove(&self, ids: &[TaskId]) -> Result<usize, StoreError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ulid().to_string()).collect();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM tasks WHERE task_id = ?1")?;
                for id in &ids {
                    removed += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn dead_letter(
        &self,
        batch_id: BatchId,
        tasks: &[Task],
        attempts: u32,
        last_error: Option<&str>,
        abandoned_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let batch_id = batch_id.as_ulid().to_string();
        let last_error = last_error.map(str::to_string);
        let abandoned_at = abandoned_at.to_rfc3339();
        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            rows.push((
                task.id.as_ulid().to_string(),
                serde_json::to_string(&task.event)?,
                task.enqueued_at.to_rfc3339(),
            ));
        }

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut moved = 0;
            {
                let mut delete = tx.prepare("DELETE FROM tasks WHERE task_id = ?1")?;
                let mut insert = tx.prepare(
                    "INSERT OR REPLACE INTO dead_letters
                        (task_id, batch_id, event, enqueued_at, attempts, last_error, abandoned_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for (task_id, event, enqueued_at) in &rows {
                    if delete.execute(params![task_id])? == 0 {
                        continue;
                    }
                    insert.execute(params![
                        task_id,
                        batch_id,
                        event,
                        enqueued_at,
                        attempts,
                        last_error,
                        abandoned_at
                    ])?;
                    moved += 1;
                }
            }
            tx.commit()?;
            Ok(moved)
        })
        .await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, StoreError> {
        type Row = (String, String, String, String, u32, Option<String>, String);

        let rows: Vec<Row> = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT task_id, batch_id, event, enqueued_at, attempts, last_error, abandoned_at
                     FROM dead_letters ORDER BY abandoned_at, task_id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        let mut letters = Vec::with_capacity(rows.len());
        for (task_id, batch_id, event, enqueued_at, attempts, last_error, abandoned_at) in rows {
            letters.push(DeadLetter {
                task_id: parse_task_id(&task_id)?,
                batch_id: batch_id
                    .parse()
                    .map_err(|e| StoreError::Corrupt(format!("bad batch id {batch_id:?}: {e}")))?,
                event: serde_json::from_str(&event)?,
                enqueued_at: parse_time(&enqueued_at)?,
                attempts,
                last_error,
                abandoned_at: parse_time(&abandoned_at)?,
            });
        }
        Ok(letters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

    fn task(id_gen: &UlidGenerator<SystemClock>, body: &str) -> Task {
        let event = RawEvent::new("!room", format!("${body}"), "@alice", "m.room.message")
            .with_content("body", body);
        Task::new(id_gen.generate_task_id(), event, Utc::now())
    }

    fn bodies(tasks: &[Task]) -> Vec<String> {
        tasks
            .iter()
            .map(|t| t.event.content["body"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn insert_then_load_in_fifo_order() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let id_gen = UlidGenerator::new(SystemClock);

        for body in ["a", "b", "c"] {
            store.insert(&task(&id_gen, body)).await.unwrap();
        }

        assert_eq!(store.count_pending().await.unwrap(), 3);
        assert_eq!(bodies(&store.load_pending(2).await.unwrap()), vec!["a", "b"]);
        assert_eq!(bodies(&store.load_pending(10).await.unwrap()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let id_gen = UlidGenerator::new(SystemClock);
        let t = task(&id_gen, "a");

        store.insert(&t).await.unwrap();
        assert!(store.insert(&t).await.is_err());
        assert_eq!(store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_deletes_only_the_given_tasks() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let id_gen = UlidGenerator::new(SystemClock);
        let tasks: Vec<Task> = ["a", "b", "c"].iter().map(|b| task(&id_gen, b)).collect();
        for t in &tasks {
            store.insert(t).await.unwrap();
        }

        let removed = store.remove(&[tasks[0].id, tasks[2].id]).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(bodies(&store.load_pending(10).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn dead_letter_moves_tasks_out_of_pending() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let id_gen = UlidGenerator::new(SystemClock);
        let tasks: Vec<Task> = ["a", "b"].iter().map(|b| task(&id_gen, b)).collect();
        for t in &tasks {
            store.insert(t).await.unwrap();
        }
        let batch_id = id_gen.generate_batch_id();

        let moved = store
            .dead_letter(batch_id, &tasks, 100, Some("HTTP 500"), Utc::now())
            .await
            .unwrap();

        assert_eq!(moved, 2);
        assert_eq!(store.count_pending().await.unwrap(), 0);
        let letters = store.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 2);
        assert!(letters.iter().all(|l| l.batch_id == batch_id && l.attempts == 100));
        assert_eq!(letters[0].last_error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn pending_tasks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite3");
        let id_gen = UlidGenerator::new(SystemClock);
        let tasks: Vec<Task> = ["a", "b", "c"].iter().map(|b| task(&id_gen, b)).collect();

        {
            let store = SqliteTaskStore::open(&path).unwrap();
            for t in &tasks {
                store.insert(t).await.unwrap();
            }
            store.remove(&[tasks[0].id]).await.unwrap();
        }

        let store = SqliteTaskStore::open(&path).unwrap();
        let reloaded = store.load_pending(10).await.unwrap();
        assert_eq!(reloaded, tasks[1..].to_vec());

        // a task inserted after the reopen sorts after the reloaded ones
        store.insert(&task(&id_gen, "d")).await.unwrap();
        assert_eq!(bodies(&store.load_pending(10).await.unwrap()), vec!["b", "c", "d"]);
    }
}
