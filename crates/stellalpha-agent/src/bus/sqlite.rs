use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::SignalBus;
use crate::signal::Signal;
use crate::store::SqliteStore;

impl SignalBus for SqliteStore {
    fn enqueue(&self, follower: &str, signal: &Signal) -> Result<bool> {
        let payload = signal.to_json().context("failed to encode signal")?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin enqueue transaction")?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO signal_queue(follower, signal_id, payload)
                 VALUES (?1, ?2, ?3)",
                params![follower, signal.id, payload],
            )
            .context("failed to insert signal")?;
        if inserted > 0 {
            tx.execute(
                "INSERT OR IGNORE INTO active_consumers(follower) VALUES (?1)",
                params![follower],
            )
            .context("failed to register active consumer")?;
        }
        tx.commit().context("failed to commit enqueue")?;
        Ok(inserted > 0)
    }

    fn dequeue(&self, follower: &str) -> Result<Option<Signal>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin dequeue transaction")?;
        let head: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, payload FROM signal_queue WHERE follower = ?1
                 ORDER BY seq ASC LIMIT 1",
                params![follower],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to read queue head")?;

        let Some((seq, payload)) = head else {
            tx.execute(
                "DELETE FROM active_consumers WHERE follower = ?1",
                params![follower],
            )
            .context("failed to retire active consumer")?;
            tx.commit().context("failed to commit dequeue")?;
            return Ok(None);
        };

        tx.execute("DELETE FROM signal_queue WHERE seq = ?1", params![seq])
            .context("failed to pop queue head")?;
        tx.commit().context("failed to commit dequeue")?;

        let signal = Signal::from_json(&payload)
            .with_context(|| format!("corrupt signal payload at seq {seq}"))?;
        Ok(Some(signal))
    }

    fn active_followers(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT follower FROM active_consumers ORDER BY follower")
            .context("failed to prepare active consumers query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query active consumers")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read active consumer row")?);
        }
        Ok(out)
    }

    fn pending(&self, follower: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM signal_queue WHERE follower = ?1",
                params![follower],
                |row| row.get(0),
            )
            .context("failed to count pending signals")?;
        Ok(count.max(0) as usize)
    }
}
