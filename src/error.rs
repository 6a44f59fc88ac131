//! Error types for fallible configuration paths.
//!
//! Explosion requests themselves never fail: invalid requests are dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("explosion type `{0}` is already registered")]
    DuplicateExplosionType(String),

    #[error("explosion type `{id}` has {chances} tile break chances but {intensities} intensities")]
    MismatchedBreakCurve {
        id: String,
        chances: usize,
        intensities: usize,
    },

    #[error("tile `{tile}` names unknown base tile index {base}")]
    UnknownBaseTile { tile: String, base: u16 },
}
