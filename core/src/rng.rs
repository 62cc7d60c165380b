//! Deterministic random number generation.
//!
//! RULE: Nothing in generation or validation may call any platform RNG.
//! All randomness flows through SeedRng instances derived from the run's
//! base seed. The only exception is drawing the base seed of a brand new run.
//!
//! Each stream is seeded additively from (base_seed + offsets) and then
//! separated by its StreamSlot. This means:
//!   - A stream is a pure function of its inputs; no state is shared
//!     between calls, requests or threads.
//!   - Adding a new stream never changes existing streams.
//!   - The track stream uses slot 0, so its seed is exactly
//!     base_seed + tier + track_index.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::types::Seed;

/// A named, deterministic RNG scoped to a single derivation.
pub struct SeedRng {
    pub stream: &'static str,
    inner: Pcg64Mcg,
}

impl SeedRng {
    /// Seed a raw stream. Prefer `for_stream` so streams stay separated.
    pub fn new(seed: Seed) -> Self {
        Self {
            stream: "raw",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Derive the stream for `slot` from the base seed plus `offsets`.
    pub fn for_stream(base_seed: Seed, slot: StreamSlot, offsets: &[u64]) -> Self {
        let additive = offsets
            .iter()
            .fold(base_seed, |acc, offset| acc.wrapping_add(*offset));
        let derived = additive ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            stream: slot.name(),
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a u32 in [min, max]. A reversed range is treated as [max, min].
    pub fn range_inclusive(&mut self, min: u32, max: u32) -> u32 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let span = u64::from(hi - lo) + 1;
        lo + self.next_u64_below(span) as u32
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every derived seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Track = 0,
    TierLayout = 1,
    ShopInventory = 2,
    BossReward = 3,
    ShopReroll = 4,
    // Add new streams here, append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::TierLayout => "tier_layout",
            Self::ShopInventory => "shop_inventory",
            Self::BossReward => "boss_reward",
            Self::ShopReroll => "shop_reroll",
        }
    }
}
