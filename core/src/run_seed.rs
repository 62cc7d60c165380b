//! Run seed orchestrator: derives a run's whole content tree from one seed.
//!
//! STREAMS (all derived from the run's base seed, see rng.rs):
//!   tier layout     base + t                        lengths, shop counts, boss
//!   shop inventory  base + t + track + shop         items offered by one shop
//!   shop reroll     base + t + track + shop + n + 1 the n-th reroll of a shop
//!   boss reward     base + t                        boss reward choices
//!   track           base + t + track                piece sequence (track_generator)
//!
//! RULE: the tree is derived once, cached, and never mutated. Every
//! sibling read goes through the cached entry; track sequences and
//! rerolls are re-derived on demand and never cached.

use crate::{
    catalog::{ContentCatalog, ContentDefinition, ContentType, PieceType},
    clock::Clock,
    config::SeedConfig,
    error::{SeedError, SeedResult},
    rng::{SeedRng, StreamSlot},
    seed_cache::{shop_key, SeedCache, SeedCacheBackend},
    selector::{select_distinct_weighted, select_weighted},
    track_generator::{TrackGenerator, TrackRequest, TrackSequence},
    types::{self, ContentId, Seed, SeedId, Tier, DEFAULT_PLAYER_CLASS, TRACKS_PER_TIER},
};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Largest base seed handed out to new runs.
pub const MAX_SEED: Seed = i32::MAX as Seed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub length: u32,
    pub shop_count: u32,
    pub boss_id: Option<ContentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: ContentId,
    pub name: String,
    pub cost: u32,
    pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossReward {
    pub id: ContentId,
    pub name: String,
    pub properties: Value,
}

/// Upper bounds on what a run derived from a seed can legitimately produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBounds {
    pub max_track_pieces: u32,
    pub max_coins: u32,
    pub max_obstacles: u32,
    pub max_powerups: u32,
}

impl RunBounds {
    fn max(self, other: Self) -> Self {
        Self {
            max_track_pieces: self.max_track_pieces.max(other.max_track_pieces),
            max_coins: self.max_coins.max(other.max_coins),
            max_obstacles: self.max_obstacles.max(other.max_obstacles),
            max_powerups: self.max_powerups.max(other.max_powerups),
        }
    }

    fn plus(self, other: Self) -> Self {
        Self {
            max_track_pieces: self.max_track_pieces.saturating_add(other.max_track_pieces),
            max_coins: self.max_coins.saturating_add(other.max_coins),
            max_obstacles: self.max_obstacles.saturating_add(other.max_obstacles),
            max_powerups: self.max_powerups.saturating_add(other.max_powerups),
        }
    }
}

/// Everything cached for one run. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub seed_id: SeedId,
    pub seed: Seed,
    pub player_id: Option<i64>,
    pub device_id: Option<String>,
    pub player_class: String,
    pub content_version: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_distance: u32,
    pub tiers: BTreeMap<Tier, Vec<TrackDescriptor>>,
    /// Keyed `{tier}_{track}_{shop}`.
    pub shop_items: BTreeMap<String, Vec<ShopItem>>,
    pub boss_rewards: BTreeMap<Tier, Vec<BossReward>>,
    pub bounds: RunBounds,
}

impl SeedEntry {
    pub fn tier(&self, tier: Tier) -> SeedResult<&[TrackDescriptor]> {
        self.tiers
            .get(&tier)
            .map(Vec::as_slice)
            .ok_or(SeedError::InvalidTier { tier })
    }

    pub fn track(&self, tier: Tier, track_index: u8) -> SeedResult<&TrackDescriptor> {
        self.tier(tier)?
            .get(usize::from(track_index))
            .ok_or(SeedError::InvalidTrackIndex { tier, track_index })
    }

    pub fn track_request(&self, tier: Tier, track_index: u8) -> SeedResult<TrackRequest<'_>> {
        let track = self.track(tier, track_index)?;
        Ok(TrackRequest {
            base_seed: self.seed,
            content_version: &self.content_version,
            tier,
            track_index,
            length: track.length,
            shop_count: track.shop_count,
            boss_id: track.boss_id.as_deref(),
            player_class: &self.player_class,
        })
    }

    pub fn tier_tracks(&self, tier: Tier) -> SeedResult<TierTracksResponse> {
        Ok(TierTracksResponse {
            seed_id: self.seed_id.clone(),
            seed: self.seed,
            tier,
            tracks: self.tier(tier)?.to_vec(),
            content_version: self.content_version.clone(),
        })
    }

    /// The payload returned when a run starts: tier 1 only.
    pub fn start_response(&self) -> SeedResult<RunStartResponse> {
        self.tier_tracks(1)
    }
}

/// Client parameters for a new run. Everything is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRun {
    pub player_id: Option<i64>,
    pub device_id: Option<String>,
    pub max_distance: Option<u32>,
    pub player_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTracksResponse {
    pub seed_id: SeedId,
    pub seed: Seed,
    pub tier: Tier,
    pub tracks: Vec<TrackDescriptor>,
    pub content_version: String,
}

pub type RunStartResponse = TierTracksResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopItemsResponse {
    pub items: Vec<ShopItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopRerollResponse {
    pub items: Vec<ShopItem>,
    pub reroll_index: u32,
    pub reroll_cost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossRewardsResponse {
    pub rewards: Vec<BossReward>,
}

pub struct RunSeedService<'a> {
    config: &'a SeedConfig,
    catalog: &'a dyn ContentCatalog,
    cache: SeedCache<'a>,
    clock: &'a dyn Clock,
}

impl<'a> RunSeedService<'a> {
    pub fn new(
        config: &'a SeedConfig,
        catalog: &'a dyn ContentCatalog,
        backend: &'a dyn SeedCacheBackend,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            config,
            catalog,
            cache: SeedCache::new(backend, clock)
                .with_purge_interval(config.runs.purge_every_writes),
            clock,
        }
    }

    pub fn config(&self) -> &SeedConfig {
        self.config
    }

    pub fn cache(&self) -> &SeedCache<'a> {
        &self.cache
    }

    /// Start a new run from a freshly drawn seed in [1, MAX_SEED].
    pub fn generate(&self, run: &NewRun) -> SeedResult<SeedEntry> {
        let seed = rand::thread_rng().gen_range(1..=MAX_SEED);
        self.generate_with_seed(seed, run)
    }

    /// Start a new run from an explicit seed.
    pub fn generate_with_seed(&self, seed: Seed, run: &NewRun) -> SeedResult<SeedEntry> {
        let content_version = self.catalog.active_version()?;
        let player_class = run
            .player_class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_PLAYER_CLASS)
            .to_string();

        let mut tiers = BTreeMap::new();
        let mut shop_items = BTreeMap::new();
        let mut boss_rewards = BTreeMap::new();
        for tier in types::tiers() {
            let layout = self.tier_layout(seed, tier, &content_version)?;
            for (track_index, track) in (0u8..).zip(&layout) {
                for shop_index in 0..track.shop_count {
                    let items = self.shop_inventory(
                        seed,
                        (tier, track_index, shop_index),
                        None,
                        &player_class,
                        &content_version,
                    )?;
                    shop_items.insert(shop_key(tier, track_index, shop_index), items);
                }
            }
            boss_rewards.insert(
                tier,
                self.boss_rewards(seed, tier, &player_class, &content_version)?,
            );
            tiers.insert(tier, layout);
        }

        let created_at = self.clock.now();
        let mut entry = SeedEntry {
            seed_id: Uuid::new_v4().to_string(),
            seed,
            player_id: run.player_id,
            device_id: run.device_id.clone(),
            player_class,
            content_version,
            created_at,
            expires_at: created_at + Duration::hours(self.config.runs.seed_ttl_hours),
            max_distance: run.max_distance.unwrap_or(self.config.runs.max_distance),
            tiers,
            shop_items,
            boss_rewards,
            bounds: RunBounds::default(),
        };
        entry.bounds = self.derive_bounds(&entry)?;
        self.cache.store(&entry)?;

        info!(
            "run seed: generated {} (seed {}, class {}, content {}) bounds={:?}",
            entry.seed_id, entry.seed, entry.player_class, entry.content_version, entry.bounds
        );
        Ok(entry)
    }

    pub fn get_seed_data(&self, seed_id: &str) -> SeedResult<SeedEntry> {
        self.cache
            .load(seed_id)?
            .ok_or_else(|| SeedError::SeedNotFound { seed_id: seed_id.to_string() })
    }

    pub fn get_tier_tracks(&self, seed_id: &str, tier: Tier) -> SeedResult<TierTracksResponse> {
        self.get_seed_data(seed_id)?.tier_tracks(tier)
    }

    pub fn select_track(&self, seed_id: &str, tier: Tier, track_index: u8) -> SeedResult<TrackSequence> {
        let entry = self.get_seed_data(seed_id)?;
        self.track_for_entry(&entry, tier, track_index)
    }

    pub fn get_shop_items(
        &self,
        seed_id: &str,
        tier: Tier,
        track_index: u8,
        shop_index: u32,
    ) -> SeedResult<ShopItemsResponse> {
        let entry = self.get_seed_data(seed_id)?;
        let key = shop_key(tier, track_index, shop_index);
        let items = entry
            .shop_items
            .get(&key)
            .cloned()
            .ok_or(SeedError::UnknownShop { key })?;
        Ok(ShopItemsResponse { items })
    }

    /// The `reroll_index`-th reroll of a shop. Only shops that exist in the
    /// entry can be rerolled.
    pub fn reroll_shop(
        &self,
        seed_id: &str,
        tier: Tier,
        track_index: u8,
        shop_index: u32,
        reroll_index: u32,
    ) -> SeedResult<ShopRerollResponse> {
        let entry = self.get_seed_data(seed_id)?;
        let key = shop_key(tier, track_index, shop_index);
        if !entry.shop_items.contains_key(&key) {
            return Err(SeedError::UnknownShop { key });
        }
        let items = self.shop_inventory(
            entry.seed,
            (tier, track_index, shop_index),
            Some(reroll_index),
            &entry.player_class,
            &entry.content_version,
        )?;
        Ok(ShopRerollResponse {
            items,
            reroll_index,
            reroll_cost: self.config.tracks.reroll_cost(reroll_index),
        })
    }

    pub fn get_boss_rewards(&self, seed_id: &str, tier: Tier) -> SeedResult<BossRewardsResponse> {
        let entry = self.get_seed_data(seed_id)?;
        let rewards = entry
            .boss_rewards
            .get(&tier)
            .cloned()
            .ok_or(SeedError::InvalidTier { tier })?;
        Ok(BossRewardsResponse { rewards })
    }

    /// Re-derive one track of a cached run.
    pub fn track_for_entry(&self, entry: &SeedEntry, tier: Tier, track_index: u8) -> SeedResult<TrackSequence> {
        let request = entry.track_request(tier, track_index)?;
        TrackGenerator::new(self.catalog, &self.config.tracks).generate(&request)
    }

    /// Bounds over every track the run could take.
    /// Per tier: the maximum over its tracks. Across tiers: the sum,
    /// plus one boss reward per tier. Shop powerups include the allowed
    /// rerolls of every placed shop.
    pub fn derive_bounds(&self, entry: &SeedEntry) -> SeedResult<RunBounds> {
        let mut total = RunBounds::default();
        for (&tier, tracks) in &entry.tiers {
            let mut tier_max = RunBounds::default();
            for track_index in (0u8..).take(tracks.len()) {
                tier_max = tier_max.max(self.track_bounds(entry, tier, track_index)?);
            }
            total = total.plus(tier_max).plus(BOSS_REWARD_BOUND);
        }
        Ok(total)
    }

    /// Exact bounds for the tracks a player actually chose, one per tier
    /// starting at tier 1.
    pub fn bounds_for_selection(&self, entry: &SeedEntry, selected: &[u8]) -> SeedResult<RunBounds> {
        let mut total = RunBounds::default();
        for (tier, &track_index) in types::tiers().zip(selected) {
            total = total
                .plus(self.track_bounds(entry, tier, track_index)?)
                .plus(BOSS_REWARD_BOUND);
        }
        Ok(total)
    }

    fn track_bounds(&self, entry: &SeedEntry, tier: Tier, track_index: u8) -> SeedResult<RunBounds> {
        let sequence = self.track_for_entry(entry, tier, track_index)?;
        let tally = sequence.tally(self.catalog, &entry.content_version)?;
        let mut shop_items: u32 = 0;
        for shop_index in 0..sequence.shop_positions.len() as u32 {
            let Some(items) = entry.shop_items.get(&shop_key(tier, track_index, shop_index)) else {
                continue;
            };
            let rerolled = self.reroll_allowance(entry, (tier, track_index, shop_index))?;
            shop_items = shop_items
                .saturating_add(items.len() as u32)
                .saturating_add(rerolled);
        }
        Ok(RunBounds {
            max_track_pieces: tally.pieces,
            max_coins: tally.coins,
            max_obstacles: tally.obstacles,
            max_powerups: tally.powerups.saturating_add(shop_items),
        })
    }

    /// Items a player could buy from the first `reroll_allowance_per_shop`
    /// rerolls of one shop.
    fn reroll_allowance(&self, entry: &SeedEntry, shop: (Tier, u8, u32)) -> SeedResult<u32> {
        let mut items: u32 = 0;
        for reroll_index in 0..self.config.validation.reroll_allowance_per_shop {
            let rerolled = self.shop_inventory(
                entry.seed,
                shop,
                Some(reroll_index),
                &entry.player_class,
                &entry.content_version,
            )?;
            items = items.saturating_add(rerolled.len() as u32);
        }
        Ok(items)
    }

    fn tier_layout(&self, seed: Seed, tier: Tier, content_version: &str) -> SeedResult<Vec<TrackDescriptor>> {
        let tracks = &self.config.tracks;
        let range = tracks.tier_length(tier)?;
        let (shops_min, shops_max) = tracks.shop_count_range;
        let mut rng = SeedRng::for_stream(seed, StreamSlot::TierLayout, &[u64::from(tier)]);

        let mut layout: Vec<TrackDescriptor> = (0..TRACKS_PER_TIER)
            .map(|_| {
                let length = rng.range_inclusive(range.min, range.max);
                let shop_count = rng.range_inclusive(shops_min, shops_max);
                TrackDescriptor { length, shop_count, boss_id: None }
            })
            .collect();

        let bosses = self
            .catalog
            .pieces_of_type(content_version, PieceType::Boss, Some(tier))?;
        let boss_id = if bosses.is_empty() {
            warn!("run seed: no boss piece available for tier {tier} in content {content_version}");
            None
        } else {
            let boss = select_weighted(&mut rng, &bosses, "boss pieces", |d| d.weight())?;
            Some(boss.content_id.clone())
        };
        for track in &mut layout {
            track.boss_id = boss_id.clone();
        }
        Ok(layout)
    }

    fn shop_inventory(
        &self,
        seed: Seed,
        (tier, track_index, shop_index): (Tier, u8, u32),
        reroll: Option<u32>,
        player_class: &str,
        content_version: &str,
    ) -> SeedResult<Vec<ShopItem>> {
        let offsets = [u64::from(tier), u64::from(track_index), u64::from(shop_index)];
        let mut rng = match reroll {
            None => SeedRng::for_stream(seed, StreamSlot::ShopInventory, &offsets),
            Some(n) => SeedRng::for_stream(
                seed,
                StreamSlot::ShopReroll,
                &[offsets[0], offsets[1], offsets[2], u64::from(n) + 1],
            ),
        };

        let powerups = self.catalog.definitions_of_type(
            content_version,
            ContentType::Powerup,
            Some(tier),
            Some(player_class),
        )?;
        if powerups.is_empty() {
            warn!("run seed: shop {tier}_{track_index}_{shop_index} has no powerups for class {player_class}");
            return Ok(Vec::new());
        }

        let (lo, hi) = self.config.tracks.shop_item_count;
        let count = rng.range_inclusive(lo, hi) as usize;
        let picks = select_distinct_weighted(&mut rng, &powerups, count, "shop powerups", |d| d.weight())?;
        Ok(picks
            .into_iter()
            .map(|def| ShopItem {
                id: def.content_id.clone(),
                name: def.name.clone(),
                cost: def.powerup().map_or(0, |p| p.cost_for_tier(tier)),
                properties: def.properties.clone(),
            })
            .collect())
    }

    fn boss_rewards(
        &self,
        seed: Seed,
        tier: Tier,
        player_class: &str,
        content_version: &str,
    ) -> SeedResult<Vec<BossReward>> {
        let mut rng = SeedRng::for_stream(seed, StreamSlot::BossReward, &[u64::from(tier)]);
        let candidates: Vec<&ContentDefinition> = self
            .catalog
            .definitions_of_type(content_version, ContentType::Powerup, Some(tier), Some(player_class))?
            .into_iter()
            .filter(|d| d.powerup().map_or(false, |p| p.can_be_boss_reward))
            .collect();
        if candidates.is_empty() {
            warn!("run seed: no boss rewards available for tier {tier}");
            return Ok(Vec::new());
        }

        let (lo, hi) = self.config.tracks.boss_reward_count;
        let count = rng.range_inclusive(lo, hi) as usize;
        let picks = select_distinct_weighted(&mut rng, &candidates, count, "boss rewards", |d| d.weight())?;
        Ok(picks
            .into_iter()
            .map(|def| BossReward {
                id: def.content_id.clone(),
                name: def.name.clone(),
                properties: def.properties.clone(),
            })
            .collect())
    }
}

/// A boss grants one reward per tier.
const BOSS_REWARD_BOUND: RunBounds = RunBounds {
    max_track_pieces: 0,
    max_coins: 0,
    max_obstacles: 0,
    max_powerups: 1,
};
