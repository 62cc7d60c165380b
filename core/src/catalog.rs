//! Content catalog: read-only, typed view over versioned definitions.
//!
//! Property bags arrive untyped. They are parsed ONCE, when a definition
//! is constructed, into a typed view per content type with explicit
//! defaults. Generation code only ever reads the typed view.
//!
//! The catalog never rejects an entry: a bag that fails to parse falls
//! back to the defaults for its type and is logged.

use crate::{
    error::{SeedError, SeedResult},
    types::{ContentId, Tier},
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    TrackPiece,
    Obstacle,
    Powerup,
    Collectible,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrackPiece => "track_piece",
            Self::Obstacle => "obstacle",
            Self::Powerup => "powerup",
            Self::Collectible => "collectible",
        }
    }

    /// Accepts the stored snake_case names and the exporter's spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "trackpiece" => Some(Self::TrackPiece),
            "obstacle" => Some(Self::Obstacle),
            "powerup" => Some(Self::Powerup),
            "collectible" | "coin" => Some(Self::Collectible),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PieceType {
    Start,
    #[default]
    Normal,
    Shop,
    Boss,
}

impl PieceType {
    /// Case-insensitive; anything unrecognised is a normal piece.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "shop" => Self::Shop,
            "boss" => Self::Boss,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRef {
    #[serde(alias = "definition")]
    pub id: ContentId,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// One named spawn slot on a track piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default, alias = "spawn_position_component_name")]
    pub component_name: String,
    #[serde(default = "default_probability", alias = "spawn_probability")]
    pub probability: f64,
    #[serde(default)]
    pub weighted_definitions: Vec<WeightedRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackPieceProps {
    pub length: f64,
    #[serde(alias = "selection_weight")]
    pub weight: f64,
    #[serde(deserialize_with = "piece_type_lenient")]
    pub piece_type: PieceType,
    #[serde(deserialize_with = "spawn_configs_lenient")]
    pub spawn_configs: Vec<SpawnConfig>,
    #[serde(deserialize_with = "tier_list")]
    pub difficulty_availability: Vec<Tier>,
}

impl Default for TrackPieceProps {
    fn default() -> Self {
        Self {
            length: 1000.0,
            weight: 1.0,
            piece_type: PieceType::Normal,
            spawn_configs: Vec::new(),
            difficulty_availability: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerupProps {
    #[serde(alias = "selection_weight")]
    pub weight: f64,
    pub base_cost: u32,
    pub cost_multiplier_per_tier: f64,
    #[serde(deserialize_with = "class_list")]
    pub allowed_classes: Vec<String>,
    #[serde(deserialize_with = "tier_list")]
    pub difficulty_availability: Vec<Tier>,
    pub can_be_boss_reward: bool,
}

impl Default for PowerupProps {
    fn default() -> Self {
        Self {
            weight: 1.0,
            base_cost: 100,
            cost_multiplier_per_tier: 0.5,
            allowed_classes: Vec::new(),
            difficulty_availability: Vec::new(),
            can_be_boss_reward: true,
        }
    }
}

impl PowerupProps {
    /// Shop price in `tier`; each tier above the first adds the multiplier.
    pub fn cost_for_tier(&self, tier: Tier) -> u32 {
        let steps = f64::from(tier.saturating_sub(1));
        let cost = f64::from(self.base_cost) * (1.0 + self.cost_multiplier_per_tier * steps);
        cost.round().max(0.0) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleProps {
    #[serde(alias = "selection_weight")]
    pub weight: f64,
    #[serde(deserialize_with = "class_list")]
    pub allowed_classes: Vec<String>,
    #[serde(deserialize_with = "tier_list")]
    pub difficulty_availability: Vec<Tier>,
}

impl Default for ObstacleProps {
    fn default() -> Self {
        Self {
            weight: 1.0,
            allowed_classes: Vec::new(),
            difficulty_availability: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectibleProps {
    #[serde(alias = "selection_weight")]
    pub weight: f64,
    /// Coins granted on pickup.
    pub value: u32,
    #[serde(deserialize_with = "class_list")]
    pub allowed_classes: Vec<String>,
    #[serde(deserialize_with = "tier_list")]
    pub difficulty_availability: Vec<Tier>,
}

impl Default for CollectibleProps {
    fn default() -> Self {
        Self {
            weight: 1.0,
            value: 1,
            allowed_classes: Vec::new(),
            difficulty_availability: Vec::new(),
        }
    }
}

/// Typed view of a property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentProps {
    TrackPiece(TrackPieceProps),
    Obstacle(ObstacleProps),
    Powerup(PowerupProps),
    Collectible(CollectibleProps),
}

impl ContentProps {
    pub fn parse(content_type: ContentType, content_id: &str, raw: &Value) -> Self {
        fn typed<T: de::DeserializeOwned + Default>(content_id: &str, raw: &Value) -> T {
            if raw.is_null() {
                return T::default();
            }
            serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                log::warn!("catalog: properties of '{content_id}' unreadable ({e}); using defaults");
                T::default()
            })
        }
        match content_type {
            ContentType::TrackPiece => Self::TrackPiece(typed(content_id, raw)),
            ContentType::Obstacle => Self::Obstacle(typed(content_id, raw)),
            ContentType::Powerup => Self::Powerup(typed(content_id, raw)),
            ContentType::Collectible => Self::Collectible(typed(content_id, raw)),
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Self::TrackPiece(p) => p.weight,
            Self::Obstacle(p) => p.weight,
            Self::Powerup(p) => p.weight,
            Self::Collectible(p) => p.weight,
        }
    }

    pub fn allowed_classes(&self) -> &[String] {
        match self {
            Self::TrackPiece(_) => &[],
            Self::Obstacle(p) => &p.allowed_classes,
            Self::Powerup(p) => &p.allowed_classes,
            Self::Collectible(p) => &p.allowed_classes,
        }
    }

    pub fn difficulty_availability(&self) -> &[Tier] {
        match self {
            Self::TrackPiece(p) => &p.difficulty_availability,
            Self::Obstacle(p) => &p.difficulty_availability,
            Self::Powerup(p) => &p.difficulty_availability,
            Self::Collectible(p) => &p.difficulty_availability,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentDefinition {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub name: String,
    /// The bag as imported, echoed back in shop and reward payloads.
    pub properties: Value,
    pub props: ContentProps,
    pub is_active: bool,
}

impl ContentDefinition {
    pub fn new(
        content_id: impl Into<ContentId>,
        content_type: ContentType,
        name: impl Into<String>,
        properties: Value,
    ) -> Self {
        let content_id = content_id.into();
        let props = ContentProps::parse(content_type, &content_id, &properties);
        Self {
            content_id,
            content_type,
            name: name.into(),
            properties,
            props,
            is_active: true,
        }
    }

    pub fn weight(&self) -> f64 {
        self.props.weight()
    }

    pub fn track_piece(&self) -> Option<&TrackPieceProps> {
        match &self.props {
            ContentProps::TrackPiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn powerup(&self) -> Option<&PowerupProps> {
        match &self.props {
            ContentProps::Powerup(p) => Some(p),
            _ => None,
        }
    }

    pub fn collectible(&self) -> Option<&CollectibleProps> {
        match &self.props {
            ContentProps::Collectible(p) => Some(p),
            _ => None,
        }
    }

    pub fn piece_type(&self) -> Option<PieceType> {
        self.track_piece().map(|p| p.piece_type)
    }

    /// Empty availability means every tier.
    pub fn available_in_tier(&self, tier: Tier) -> bool {
        let tiers = self.props.difficulty_availability();
        tiers.is_empty() || tiers.contains(&tier)
    }

    /// Empty allow-list means every class.
    pub fn allows_class(&self, player_class: &str) -> bool {
        let classes = self.props.allowed_classes();
        classes.is_empty() || classes.iter().any(|c| c.eq_ignore_ascii_case(player_class))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVersion {
    pub version: String,
    pub content_hash: String,
    pub exported_at: Option<String>,
    pub is_active: bool,
}

/// The single query surface generation reads content through.
pub trait ContentCatalog {
    /// The version new runs are generated against.
    fn active_version(&self) -> SeedResult<String>;

    /// Active definitions of one type in catalog order, optionally
    /// restricted to a tier and to a player class.
    fn definitions_of_type(
        &self,
        version: &str,
        content_type: ContentType,
        tier: Option<Tier>,
        player_class: Option<&str>,
    ) -> SeedResult<Vec<&ContentDefinition>>;

    fn definition(&self, version: &str, content_id: &str) -> SeedResult<Option<&ContentDefinition>>;

    /// Track pieces of one piece type, in catalog order.
    fn pieces_of_type(
        &self,
        version: &str,
        piece_type: PieceType,
        tier: Option<Tier>,
    ) -> SeedResult<Vec<&ContentDefinition>> {
        Ok(self
            .definitions_of_type(version, ContentType::TrackPiece, tier, None)?
            .into_iter()
            .filter(|d| d.piece_type() == Some(piece_type))
            .collect())
    }
}

#[derive(Debug, Clone)]
struct VersionContent {
    info: ContentVersion,
    definitions: Vec<ContentDefinition>,
    index: HashMap<ContentId, usize>,
}

/// Every loaded content version, held in memory with typed views.
#[derive(Debug, Clone, Default)]
pub struct ContentLibrary {
    versions: Vec<VersionContent>,
}

impl ContentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a version. An active version deactivates all others.
    pub fn insert_version(&mut self, info: ContentVersion, definitions: Vec<ContentDefinition>) {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.contains_key(&def.content_id) {
                log::warn!(
                    "catalog: duplicate content_id '{}' in version {}; keeping the first",
                    def.content_id, info.version
                );
                continue;
            }
            index.insert(def.content_id.clone(), i);
        }
        if info.is_active {
            for v in &mut self.versions {
                v.info.is_active = false;
            }
        }
        let content = VersionContent { info, definitions, index };
        match self.versions.iter_mut().find(|v| v.info.version == content.info.version) {
            Some(existing) => *existing = content,
            None => self.versions.push(content),
        }
    }

    pub fn activate(&mut self, version: &str) -> SeedResult<()> {
        if !self.versions.iter().any(|v| v.info.version == version) {
            return Err(SeedError::UnknownContentVersion { version: version.to_string() });
        }
        for v in &mut self.versions {
            v.info.is_active = v.info.version == version;
        }
        Ok(())
    }

    pub fn versions(&self) -> impl Iterator<Item = &ContentVersion> {
        self.versions.iter().map(|v| &v.info)
    }

    pub fn definition_count(&self, version: &str) -> usize {
        self.versions
            .iter()
            .find(|v| v.info.version == version)
            .map_or(0, |v| v.definitions.len())
    }

    fn version(&self, version: &str) -> SeedResult<&VersionContent> {
        self.versions
            .iter()
            .find(|v| v.info.version == version)
            .ok_or_else(|| SeedError::UnknownContentVersion { version: version.to_string() })
    }

    /// Small, fully featured catalog for use in tests.
    pub fn default_test() -> Self {
        let export = crate::import::ContentExport::default_test();
        match Self::from_export(&export) {
            Ok(library) => library,
            Err(e) => unreachable!("built-in test content is valid: {e}"),
        }
    }
}

impl ContentCatalog for ContentLibrary {
    fn active_version(&self) -> SeedResult<String> {
        self.versions
            .iter()
            .find(|v| v.info.is_active)
            .map(|v| v.info.version.clone())
            .ok_or(SeedError::NoActiveContentVersion)
    }

    fn definitions_of_type(
        &self,
        version: &str,
        content_type: ContentType,
        tier: Option<Tier>,
        player_class: Option<&str>,
    ) -> SeedResult<Vec<&ContentDefinition>> {
        Ok(self
            .version(version)?
            .definitions
            .iter()
            .filter(|d| d.is_active && d.content_type == content_type)
            .filter(|d| tier.map_or(true, |t| d.available_in_tier(t)))
            .filter(|d| player_class.map_or(true, |c| d.allows_class(c)))
            .collect())
    }

    fn definition(&self, version: &str, content_id: &str) -> SeedResult<Option<&ContentDefinition>> {
        let content = self.version(version)?;
        Ok(content
            .index
            .get(content_id)
            .map(|&i| &content.definitions[i])
            .filter(|d| d.is_active))
    }
}

// ── Lenient property readers ─────────────────────────────────────────

fn default_weight() -> f64 {
    1.0
}

fn default_probability() -> f64 {
    1.0
}

fn piece_type_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<PieceType, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => PieceType::parse(&s),
        _ => PieceType::Normal,
    })
}

/// spawn_configs may arrive as an array or as a JSON-encoded string.
fn spawn_configs_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SpawnConfig>, D::Error> {
    let value = match Value::deserialize(d)? {
        Value::Null => return Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        Value::String(s) => serde_json::from_str(&s).map_err(de::Error::custom)?,
        other => other,
    };
    serde_json::from_value(value).map_err(de::Error::custom)
}

fn tier_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Tier>, D::Error> {
    Ok(parse_tier_list(&Value::deserialize(d)?))
}

fn class_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(parse_class_list(&Value::deserialize(d)?))
}

fn parse_tier_list(value: &Value) -> Vec<Tier> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_tier).collect(),
        Value::String(s) if s.trim_start().starts_with('[') => serde_json::from_str::<Value>(s)
            .map(|v| parse_tier_list(&v))
            .unwrap_or_default(),
        Value::String(s) => s
            .split(',')
            .filter_map(|part| parse_tier(&Value::String(part.to_string())))
            .collect(),
        Value::Null => Vec::new(),
        other => parse_tier(other).into_iter().collect(),
    }
}

/// `2`, `"2"` and `"Tier2"` all mean tier 2.
fn parse_tier(value: &Value) -> Option<Tier> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| Tier::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn parse_class_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) if s.trim_start().starts_with('[') => serde_json::from_str::<Value>(s)
            .map(|v| parse_class_list(&v))
            .unwrap_or_default(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn track_piece_defaults_apply_to_empty_bag() {
        let def = ContentDefinition::new("p", ContentType::TrackPiece, "P", json!({}));
        let props = def.track_piece().unwrap();
        assert_eq!(props.length, 1000.0);
        assert_eq!(props.weight, 1.0);
        assert_eq!(props.piece_type, PieceType::Normal);
        assert!(props.spawn_configs.is_empty());
    }

    #[test]
    fn string_encoded_spawn_configs_are_decoded() {
        let bag = json!({
            "piece_type": "SHOP",
            "spawn_configs": "[{\"component_name\":\"Lane0\",\"probability\":0.5,\"weighted_definitions\":[{\"id\":\"coin\"}]}]"
        });
        let def = ContentDefinition::new("p", ContentType::TrackPiece, "P", bag);
        let props = def.track_piece().unwrap();
        assert_eq!(props.piece_type, PieceType::Shop);
        assert_eq!(props.spawn_configs.len(), 1);
        assert_eq!(props.spawn_configs[0].component_name, "Lane0");
        assert_eq!(props.spawn_configs[0].weighted_definitions[0].weight, 1.0);
    }

    #[test]
    fn unreadable_bag_falls_back_to_defaults() {
        let def = ContentDefinition::new(
            "x",
            ContentType::Powerup,
            "X",
            json!({ "base_cost": "expensive" }),
        );
        assert_eq!(def.powerup().unwrap(), &PowerupProps::default());
    }

    #[test]
    fn tier_and_class_filters_accept_loose_spellings() {
        let def = ContentDefinition::new(
            "shield",
            ContentType::Powerup,
            "Shield",
            json!({ "difficulty_availability": ["Tier2", 3], "allowed_classes": "Tank, Scout" }),
        );
        assert!(!def.available_in_tier(1));
        assert!(def.available_in_tier(2) && def.available_in_tier(3));
        assert!(def.allows_class("tank"));
        assert!(!def.allows_class("Vanilla"));
    }

    #[test]
    fn cost_scales_per_tier() {
        let props = PowerupProps { base_cost: 100, cost_multiplier_per_tier: 0.5, ..Default::default() };
        assert_eq!(props.cost_for_tier(1), 100);
        assert_eq!(props.cost_for_tier(2), 150);
        assert_eq!(props.cost_for_tier(3), 200);
    }

    #[test]
    fn activating_a_version_deactivates_the_rest() {
        let mut library = ContentLibrary::new();
        for (version, active) in [("1.0.0", true), ("1.1.0", true)] {
            library.insert_version(
                ContentVersion {
                    version: version.into(),
                    content_hash: String::new(),
                    exported_at: None,
                    is_active: active,
                },
                Vec::new(),
            );
        }
        assert_eq!(library.active_version().unwrap(), "1.1.0");
        library.activate("1.0.0").unwrap();
        assert_eq!(library.versions().filter(|v| v.is_active).count(), 1);
        assert_eq!(library.active_version().unwrap(), "1.0.0");
        assert!(library.activate("9.9.9").is_err());
    }
}
