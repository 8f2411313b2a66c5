use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;

use crate::store::SqliteStore;

/// Who follows whom. The watcher reads it; the CLI writes it.
pub trait FollowRegistry: Send + Sync {
    fn star_traders(&self) -> Result<HashSet<String>>;
    fn followers_of(&self, star: &str) -> Result<Vec<String>>;
}

impl SqliteStore {
    /// Returns `false` when the pair already existed.
    pub fn follow(&self, star: &str, follower: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO follows(star_wallet, follower, created_at)
                 VALUES (?1, ?2, ?3)",
                params![star, follower, Utc::now().to_rfc3339()],
            )
            .context("failed to insert follow")?;
        Ok(inserted > 0)
    }

    /// Returns `false` when there was nothing to remove.
    pub fn unfollow(&self, star: &str, follower: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM follows WHERE star_wallet = ?1 AND follower = ?2",
                params![star, follower],
            )
            .context("failed to delete follow")?;
        Ok(removed > 0)
    }
}

impl FollowRegistry for SqliteStore {
    fn star_traders(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT star_wallet FROM follows")
            .context("failed to prepare star trader query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query star traders")?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row.context("failed to read star trader row")?);
        }
        Ok(out)
    }

    fn followers_of(&self, star: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT follower FROM follows WHERE star_wallet = ?1
                 ORDER BY created_at ASC, follower ASC",
            )
            .context("failed to prepare followers query")?;
        let rows = stmt
            .query_map(params![star], |row| row.get::<_, String>(0))
            .context("failed to query followers")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to read follower row")?);
        }
        Ok(out)
    }
}
