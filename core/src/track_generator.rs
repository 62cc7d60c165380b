//! Track generator: one track's piece sequence, derived from a seed.
//!
//! GENERATION ORDER (fixed; every step draws from the same track stream):
//!   1. One Start piece.
//!   2. Normal pieces until the normalized length reaches the target.
//!   3. Shop slots computed, then one Shop piece drawn per slot.
//!   4. The tier's boss piece appended (no draw).
//!   5. Spawn slots resolved piece by piece, slot by slot.
//!
//! Reordering these steps changes every track ever generated.
//! Sequences are never cached; re-running with the same request is
//! guaranteed to produce the same sequence.

use crate::{
    catalog::{ContentCatalog, ContentDefinition, ContentType, PieceType},
    config::TrackConfig,
    error::{SeedError, SeedResult},
    rng::{SeedRng, StreamSlot},
    selector::select_weighted,
    types::{ContentId, Seed, Tier},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a single track is derived from.
#[derive(Debug, Clone, Copy)]
pub struct TrackRequest<'a> {
    pub base_seed: Seed,
    pub content_version: &'a str,
    pub tier: Tier,
    pub track_index: u8,
    /// Target length in normalized units.
    pub length: u32,
    pub shop_count: u32,
    pub boss_id: Option<&'a str>,
    pub player_class: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedPiece {
    pub piece_id: ContentId,
    /// Spawn slot name → spawned definition, or None when nothing spawns.
    pub spawn_assignment: BTreeMap<String, Option<ContentId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSequence {
    pub pieces: Vec<PlacedPiece>,
    /// Indices into `pieces` that hold shop pieces, in placement order.
    pub shop_positions: Vec<usize>,
    /// The boss actually placed; None when the boss piece was missing.
    pub boss_id: Option<ContentId>,
    pub length: u32,
    pub shop_count: u32,
    /// Normalized length of the start and normal pieces at fill time.
    pub accumulated_length: f64,
}

/// What a player could at most encounter on one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTally {
    pub pieces: u32,
    pub coins: u32,
    pub obstacles: u32,
    pub powerups: u32,
}

impl TrackSequence {
    pub fn tally(&self, catalog: &dyn ContentCatalog, content_version: &str) -> SeedResult<TrackTally> {
        let mut tally = TrackTally {
            pieces: self.pieces.len() as u32,
            ..TrackTally::default()
        };
        for piece in &self.pieces {
            for spawned in piece.spawn_assignment.values().flatten() {
                let Some(def) = catalog.definition(content_version, spawned)? else {
                    continue;
                };
                match def.content_type {
                    ContentType::Collectible => {
                        let value = def.collectible().map_or(1, |c| c.value);
                        tally.coins = tally.coins.saturating_add(value);
                    }
                    ContentType::Obstacle => tally.obstacles = tally.obstacles.saturating_add(1),
                    ContentType::Powerup => tally.powerups = tally.powerups.saturating_add(1),
                    ContentType::TrackPiece => {}
                }
            }
        }
        Ok(tally)
    }
}

pub struct TrackGenerator<'a> {
    catalog: &'a dyn ContentCatalog,
    config: &'a TrackConfig,
}

impl<'a> TrackGenerator<'a> {
    pub fn new(catalog: &'a dyn ContentCatalog, config: &'a TrackConfig) -> Self {
        Self { catalog, config }
    }

    pub fn generate(&self, req: &TrackRequest<'_>) -> SeedResult<TrackSequence> {
        let mut rng = SeedRng::for_stream(
            req.base_seed,
            StreamSlot::Track,
            &[u64::from(req.tier), u64::from(req.track_index)],
        );
        let version = req.content_version;
        let target = f64::from(req.length);

        // 1. Start piece.
        let starts = self.catalog.pieces_of_type(version, PieceType::Start, Some(req.tier))?;
        let start = select_weighted(&mut rng, &starts, "start pieces", |d| d.weight())?;
        let mut pieces: Vec<&ContentDefinition> = vec![*start];
        let mut accumulated = self.normalized_length(start);

        // 2. Fill with normal pieces. Zero-length pieces could never finish the track.
        if accumulated < target {
            let normals: Vec<&ContentDefinition> = self
                .catalog
                .pieces_of_type(version, PieceType::Normal, Some(req.tier))?
                .into_iter()
                .filter(|d| self.normalized_length(d) > 0.0)
                .collect();
            if normals.is_empty() {
                return Err(SeedError::NoNormalPiecesAvailable {
                    tier: req.tier,
                    track_index: req.track_index,
                });
            }
            while accumulated < target {
                let piece = select_weighted(&mut rng, &normals, "normal pieces", |d| d.weight())?;
                accumulated += self.normalized_length(piece);
                pieces.push(*piece);
            }
        }

        // 3. Shops.
        let shop_positions = shop_slots(
            pieces.len(),
            req.shop_count as usize,
            self.config.shop_position_range,
        );
        if shop_positions.len() < req.shop_count as usize {
            log::warn!(
                "track: tier {} track {} has room for {} of {} shops",
                req.tier, req.track_index, shop_positions.len(), req.shop_count
            );
        }
        if !shop_positions.is_empty() {
            let shops = self.catalog.pieces_of_type(version, PieceType::Shop, Some(req.tier))?;
            for &slot in &shop_positions {
                pieces[slot] = *select_weighted(&mut rng, &shops, "shop pieces", |d| d.weight())?;
            }
        }

        // 4. Boss.
        let mut boss_id = None;
        if let Some(id) = req.boss_id {
            match self.catalog.definition(version, id)? {
                Some(boss) if boss.content_type == ContentType::TrackPiece => {
                    pieces.push(boss);
                    boss_id = Some(boss.content_id.clone());
                }
                _ => {
                    let missing = SeedError::BossPieceMissing {
                        boss_id: id.to_string(),
                        content_version: version.to_string(),
                    };
                    log::warn!("track: {missing}; continuing without a boss");
                }
            }
        }

        // 5. Spawns.
        let mut placed = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            placed.push(PlacedPiece {
                piece_id: piece.content_id.clone(),
                spawn_assignment: self.resolve_spawns(&mut rng, piece, req)?,
            });
        }

        log::debug!(
            "track: seed={} tier={} track={} pieces={} shops={:?} length={:.2}/{}",
            req.base_seed, req.tier, req.track_index, placed.len(), shop_positions,
            accumulated, req.length
        );

        Ok(TrackSequence {
            pieces: placed,
            shop_positions,
            boss_id,
            length: req.length,
            shop_count: req.shop_count,
            accumulated_length: accumulated,
        })
    }

    fn normalized_length(&self, piece: &ContentDefinition) -> f64 {
        piece
            .track_piece()
            .map_or(0.0, |p| p.length / self.config.length_unit_divisor)
    }

    fn resolve_spawns(
        &self,
        rng: &mut SeedRng,
        piece: &ContentDefinition,
        req: &TrackRequest<'_>,
    ) -> SeedResult<BTreeMap<String, Option<ContentId>>> {
        let mut assignment = BTreeMap::new();
        let Some(props) = piece.track_piece() else {
            return Ok(assignment);
        };

        for slot in &props.spawn_configs {
            let mut spawned = None;
            if rng.chance(slot.probability) {
                let mut candidates: Vec<(&ContentDefinition, f64)> = Vec::new();
                for weighted in &slot.weighted_definitions {
                    if let Some(def) = self.catalog.definition(req.content_version, &weighted.id)? {
                        if def.allows_class(req.player_class) {
                            candidates.push((def, weighted.weight));
                        }
                    }
                }
                if !candidates.is_empty() {
                    let (def, _) =
                        select_weighted(rng, &candidates, &slot.component_name, |c| c.1)?;
                    spawned = Some(def.content_id.clone());
                }
            }
            assignment.insert(slot.component_name.clone(), spawned);
        }
        Ok(assignment)
    }
}

/// Evenly spread `shop_count` slots over the `range` fraction of a track
/// of `piece_count` pieces. Slots stay within [1, piece_count - 1]; a taken
/// slot probes forward, wrapping back to 1. Never returns more slots than
/// there is room for.
pub fn shop_slots(piece_count: usize, shop_count: usize, range: (f64, f64)) -> Vec<usize> {
    if piece_count < 2 || shop_count == 0 {
        return Vec::new();
    }
    let last = piece_count - 1;
    let count = shop_count.min(last);
    let (lo, hi) = range;

    let mut used = vec![false; piece_count];
    let mut slots = Vec::with_capacity(count);
    for i in 0..count {
        let fraction = lo + (hi - lo) * (i as f64 + 0.5) / count as f64;
        let mut slot = ((fraction * piece_count as f64).round() as usize).clamp(1, last);
        while used[slot] {
            slot = if slot >= last { 1 } else { slot + 1 };
        }
        used[slot] = true;
        slots.push(slot);
    }
    slots
}
