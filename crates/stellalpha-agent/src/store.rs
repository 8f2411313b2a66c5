use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS follows (
    star_wallet TEXT NOT NULL,
    follower TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (star_wallet, follower)
);
CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower);

CREATE TABLE IF NOT EXISTS signal_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    follower TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_signal_queue_follower_signal
    ON signal_queue(follower, signal_id);

CREATE TABLE IF NOT EXISTS active_consumers (
    follower TEXT PRIMARY KEY
);
";

/// Single SQLite handle shared by the follow registry and the signal bus.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create sqlite parent dir: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db: {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy_timeout")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to set sqlite journal mode WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set sqlite synchronous NORMAL")?;
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite")?;
        Self::with_schema(conn)
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create agent schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

/// Runs a storage call on tokio's blocking pool. Every SQLite access from
/// async code goes through here: a `busy_timeout` wait must never park a
/// runtime worker that also drives the event stream.
pub async fn run_blocking<T, F>(action: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(action)
        .await
        .context("storage task failed")?
}
