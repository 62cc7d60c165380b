use super::SeedStore;
use crate::{error::SeedResult, seed_cache::SeedCacheBackend};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl SeedCacheBackend for SeedStore {
    fn put(&self, key: &str, payload: &str, expires_at: DateTime<Utc>) -> SeedResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO seed_cache (cache_key, payload, expires_at)
             VALUES (?1, ?2, ?3)",
            params![key, payload, expires_at.timestamp_millis()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str, now: DateTime<Utc>) -> SeedResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT payload FROM seed_cache WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> SeedResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM seed_cache WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?)
    }
}
