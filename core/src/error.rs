use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No candidates available in pool '{pool}'")]
    EmptyCandidateSet { pool: String },

    #[error("No normal track pieces available for tier {tier} track {track_index}")]
    NoNormalPiecesAvailable { tier: u8, track_index: u8 },

    #[error("Seed expired or invalid: {seed_id}")]
    SeedNotFound { seed_id: String },

    #[error("Boss piece '{boss_id}' not found in content version {content_version}")]
    BossPieceMissing { boss_id: String, content_version: String },

    #[error("No active content version found")]
    NoActiveContentVersion,

    #[error("Content version '{version}' not found")]
    UnknownContentVersion { version: String },

    #[error("Invalid tier {tier}")]
    InvalidTier { tier: u8 },

    #[error("Invalid track index {track_index} for tier {tier}")]
    InvalidTrackIndex { tier: u8, track_index: u8 },

    #[error("No shop inventory under key '{key}'")]
    UnknownShop { key: String },

    #[error("Invalid content export: {reason}")]
    InvalidContentExport { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SeedResult<T> = Result<T, SeedError>;

/// Who has to fix a failure. The HTTP layer maps these to 4xx / 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

impl SeedError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SeedNotFound { .. }
            | Self::InvalidTier { .. }
            | Self::InvalidTrackIndex { .. }
            | Self::UnknownShop { .. }
            | Self::InvalidContentExport { .. } => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }
}
