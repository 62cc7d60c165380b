//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Catalog loading and the seed cache call store methods; they never
//! execute SQL directly.

use crate::error::SeedResult;
use rusqlite::Connection;

mod content;
mod seed_cache;

pub use content::ImportOutcome;

pub struct SeedStore {
    conn: Connection,
}

impl SeedStore {
    pub fn open(path: &str) -> SeedResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SeedResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SeedResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_content.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_seed_cache.sql"))?;
        Ok(())
    }
}
