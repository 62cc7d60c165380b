//! Content export format and version hashing.
//!
//! The game client exports its content registry as one JSON document:
//!   { "version": "...", "exported_at": "...", "definitions": [ {type, id, name, properties} ] }
//!
//! The content hash is SHA-256 over the definitions sorted by id, so
//! re-exporting identical content in a different order is a no-op.

use crate::{
    catalog::{ContentDefinition, ContentLibrary, ContentType, ContentVersion},
    error::{SeedError, SeedResult},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentExport {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub definitions: Vec<ExportedDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedDefinition {
    #[serde(rename = "type")]
    pub content_type: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

impl ExportedDefinition {
    /// None for content types the seed engine does not know.
    pub fn to_definition(&self) -> Option<ContentDefinition> {
        match ContentType::parse(&self.content_type) {
            Some(content_type) => Some(ContentDefinition::new(
                self.id.clone(),
                content_type,
                self.name.clone(),
                self.properties.clone(),
            )),
            None => {
                log::warn!(
                    "import: skipping '{}' with unknown content type '{}'",
                    self.id, self.content_type
                );
                None
            }
        }
    }
}

impl ContentExport {
    pub fn from_json(raw: &str) -> SeedResult<Self> {
        let export: Self = serde_json::from_str(raw)?;
        export.check()?;
        Ok(export)
    }

    pub fn check(&self) -> SeedResult<()> {
        if self.version.trim().is_empty() {
            return Err(SeedError::InvalidContentExport {
                reason: "content version is required".into(),
            });
        }
        Ok(())
    }

    pub fn content_hash(&self) -> SeedResult<String> {
        content_hash(&self.definitions)
    }

    pub fn typed_definitions(&self) -> Vec<ContentDefinition> {
        self.definitions
            .iter()
            .filter_map(ExportedDefinition::to_definition)
            .collect()
    }

    /// A small content version exercising every piece type, spawn slots,
    /// class and tier restrictions. Shared by the unit and integration tests.
    pub fn default_test() -> Self {
        let definitions = vec![
            json!({ "type": "track_piece", "id": "start_tunnel", "name": "Start Tunnel",
                    "properties": { "piece_type": "Start", "length": 1600, "weight": 1 } }),
            json!({ "type": "track_piece", "id": "sewer_straight", "name": "Sewer Straight",
                    "properties": { "piece_type": "Normal", "length": 800, "weight": 3,
                        "spawn_configs": [
                            { "component_name": "CoinLane", "probability": 0.8,
                              "weighted_definitions": [ { "id": "coin_gold", "weight": 1 },
                                                        { "id": "coin_silver", "weight": 3 } ] },
                            { "component_name": "ObstacleSlot", "probability": 0.5,
                              "weighted_definitions": [ { "id": "obstacle_pipe", "weight": 2 },
                                                        { "id": "obstacle_rat", "weight": 1 } ] } ] } }),
            json!({ "type": "track_piece", "id": "sewer_bend", "name": "Sewer Bend",
                    "properties": { "piece_type": "Normal", "length": 1200, "weight": 1,
                        "spawn_configs": [
                            { "component_name": "PowerUpSlot", "probability": 0.3,
                              "weighted_definitions": [ { "id": "powerup_magnet", "weight": 1 },
                                                        { "id": "powerup_coin_doubler", "weight": 1 } ] } ] } }),
            json!({ "type": "track_piece", "id": "sewer_drop", "name": "Sewer Drop",
                    "properties": { "piece_type": "Normal", "length": 800, "weight": 2,
                        "difficulty_availability": [2, 3],
                        "spawn_configs": [
                            { "component_name": "ObstacleSlot", "probability": 0.7,
                              "weighted_definitions": [ { "id": "obstacle_pipe", "weight": 1 } ] } ] } }),
            json!({ "type": "track_piece", "id": "shop_alcove", "name": "Shop Alcove",
                    "properties": { "piece_type": "Shop", "length": 800 } }),
            json!({ "type": "track_piece", "id": "boss_gator", "name": "Gator Lair",
                    "properties": { "piece_type": "Boss", "length": 1600,
                        "difficulty_availability": [1, 2] } }),
            json!({ "type": "track_piece", "id": "boss_king_rat", "name": "Rat King Throne",
                    "properties": { "piece_type": "Boss", "length": 2000,
                        "difficulty_availability": [3],
                        "spawn_configs": [
                            { "component_name": "RewardCoins", "probability": 1.0,
                              "weighted_definitions": [ { "id": "coin_gold", "weight": 1 } ] } ] } }),
            json!({ "type": "obstacle", "id": "obstacle_pipe", "name": "Burst Pipe",
                    "properties": { "weight": 2 } }),
            json!({ "type": "obstacle", "id": "obstacle_rat", "name": "Sewer Rat",
                    "properties": { "weight": 1, "allowed_classes": ["Vanilla", "Tank"] } }),
            json!({ "type": "collectible", "id": "coin_gold", "name": "Gold Coin",
                    "properties": { "value": 5 } }),
            json!({ "type": "collectible", "id": "coin_silver", "name": "Silver Coin",
                    "properties": { "value": 1 } }),
            json!({ "type": "powerup", "id": "powerup_magnet", "name": "Magnet",
                    "properties": { "base_cost": 100, "cost_multiplier_per_tier": 0.5, "weight": 2 } }),
            json!({ "type": "powerup", "id": "powerup_shield", "name": "Shield",
                    "properties": { "base_cost": 150, "cost_multiplier_per_tier": 0.5 } }),
            json!({ "type": "powerup", "id": "powerup_speed", "name": "Speed Boost",
                    "properties": { "base_cost": 80, "cost_multiplier_per_tier": 0.25,
                        "can_be_boss_reward": false } }),
            json!({ "type": "powerup", "id": "powerup_extra_life", "name": "Extra Life",
                    "properties": { "base_cost": 300, "cost_multiplier_per_tier": 1.0,
                        "difficulty_availability": ["Tier2", "Tier3"] } }),
            json!({ "type": "powerup", "id": "powerup_coin_doubler", "name": "Coin Doubler",
                    "properties": { "base_cost": 120, "allowed_classes": ["Scavenger"] } }),
        ];
        Self {
            version: "test-1.0.0".into(),
            exported_at: None,
            definitions: definitions
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        }
    }
}

/// SHA-256 over the definitions sorted by id.
pub fn content_hash(definitions: &[ExportedDefinition]) -> SeedResult<String> {
    let mut sorted: Vec<&ExportedDefinition> = definitions.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let canonical = serde_json::to_string(&sorted)?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

impl ContentLibrary {
    /// Build a single-version, active library straight from an export.
    pub fn from_export(export: &ContentExport) -> SeedResult<Self> {
        export.check()?;
        let mut library = ContentLibrary::new();
        library.insert_version(
            ContentVersion {
                version: export.version.clone(),
                content_hash: export.content_hash()?,
                exported_at: export.exported_at.clone(),
                is_active: true,
            },
            export.typed_definitions(),
        );
        Ok(library)
    }
}
