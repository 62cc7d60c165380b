//! Shared primitive types used across the seed engine.

/// The integer a run's whole content tree is derived from.
pub type Seed = u64;

/// Opaque token identifying one cached seed entry.
pub type SeedId = String;

/// Stable key of a content definition, unique within a content version.
pub type ContentId = String;

/// Difficulty stage, 1-based.
pub type Tier = u8;

/// Number of tiers in a finite run.
pub const TIER_COUNT: Tier = 3;

/// Candidate tracks offered per tier.
pub const TRACKS_PER_TIER: u8 = 3;

/// Class used when the client does not send one.
pub const DEFAULT_PLAYER_CLASS: &str = "Vanilla";

/// Iterate the tiers of a finite run in order.
pub fn tiers() -> impl Iterator<Item = Tier> {
    1..=TIER_COUNT
}

pub fn is_valid_tier(tier: Tier) -> bool {
    (1..=TIER_COUNT).contains(&tier)
}
