//! Seed cache: key/value storage with a per-entry expiry.
//!
//! RULE: an entry is readable only while now < expires_at. A zero TTL
//! therefore produces an entry that can never be read back.
//!
//! Entries are written once under `seed:{seed_id}`. Entries written by
//! older servers under `run_seed_{seed_id}` are still honoured on read.
//!
//! Expired entries are purged every `purge_every` writes, so a long-lived
//! process does not accumulate dead runs.

use crate::{
    clock::Clock,
    error::SeedResult,
    run_seed::SeedEntry,
    types::Tier,
};
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Mutex;

pub const KEY_PREFIX: &str = "seed:";
pub const LEGACY_KEY_PREFIX: &str = "run_seed_";

pub fn cache_key(seed_id: &str) -> String {
    format!("{KEY_PREFIX}{seed_id}")
}

pub fn legacy_cache_key(seed_id: &str) -> String {
    format!("{LEGACY_KEY_PREFIX}{seed_id}")
}

/// Sub-key of one shop inventory inside a seed entry.
pub fn shop_key(tier: Tier, track_index: u8, shop_index: u32) -> String {
    format!("{tier}_{track_index}_{shop_index}")
}

/// Raw storage the seed cache sits on.
pub trait SeedCacheBackend {
    fn put(&self, key: &str, payload: &str, expires_at: DateTime<Utc>) -> SeedResult<()>;

    /// The payload under `key`, or None if absent or expired at `now`.
    fn get(&self, key: &str, now: DateTime<Utc>) -> SeedResult<Option<String>>;

    /// Drop every entry expired at `now`. Returns how many were dropped.
    fn purge_expired(&self, now: DateTime<Utc>) -> SeedResult<usize>;
}

/// Single-process backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SeedCacheBackend for MemoryCache {
    fn put(&self, key: &str, payload: &str, expires_at: DateTime<Utc>) -> SeedResult<()> {
        self.lock().insert(key.to_string(), (payload.to_string(), expires_at));
        Ok(())
    }

    fn get(&self, key: &str, now: DateTime<Utc>) -> SeedResult<Option<String>> {
        Ok(self
            .lock()
            .get(key)
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(payload, _)| payload.clone()))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> SeedResult<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        Ok(before - entries.len())
    }
}

/// Typed access to seed entries over any backend.
pub struct SeedCache<'a> {
    backend: &'a dyn SeedCacheBackend,
    clock: &'a dyn Clock,
    purge_every: u32,
    writes: Cell<u32>,
}

impl<'a> SeedCache<'a> {
    /// A cache that never purges on its own.
    pub fn new(backend: &'a dyn SeedCacheBackend, clock: &'a dyn Clock) -> Self {
        Self {
            backend,
            clock,
            purge_every: 0,
            writes: Cell::new(0),
        }
    }

    /// Purge expired entries after every `writes` stores. Zero disables it.
    pub fn with_purge_interval(mut self, writes: u32) -> Self {
        self.purge_every = writes;
        self
    }

    pub fn store(&self, entry: &SeedEntry) -> SeedResult<()> {
        let payload = serde_json::to_string(entry)?;
        self.backend
            .put(&cache_key(&entry.seed_id), &payload, entry.expires_at)?;

        if self.purge_every > 0 {
            let writes = self.writes.get() + 1;
            if writes >= self.purge_every {
                self.writes.set(0);
                self.purge_expired()?;
            } else {
                self.writes.set(writes);
            }
        }
        Ok(())
    }

    /// None when the entry never existed or has expired.
    pub fn load(&self, seed_id: &str) -> SeedResult<Option<SeedEntry>> {
        let now = self.clock.now();
        for key in [cache_key(seed_id), legacy_cache_key(seed_id)] {
            if let Some(payload) = self.backend.get(&key, now)? {
                let entry: SeedEntry = serde_json::from_str(&payload)?;
                if now < entry.expires_at {
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    pub fn purge_expired(&self) -> SeedResult<usize> {
        let purged = self.backend.purge_expired(self.clock.now())?;
        if purged > 0 {
            log::info!("seed cache: purged {purged} expired entries");
        }
        Ok(purged)
    }
}
