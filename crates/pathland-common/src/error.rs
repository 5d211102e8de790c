//! Error types for Pathland.

use thiserror::Error;

/// Top-level error type for Pathland operations.
#[derive(Debug, Error)]
pub enum PathlandError {
    /// Invalid generation settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be written
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
}

/// Generation settings that cannot produce a valid world.
///
/// These are raised at setup time; nothing is generated from a rejected
/// configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No noise layers were supplied
    #[error("at least one noise layer is required")]
    NoLayers,

    /// A layer has a negative or non-finite amplitude
    #[error("noise layer {index} has invalid amplitude {amplitude}")]
    InvalidAmplitude {
        /// Layer index
        index: usize,
        /// Offending amplitude
        amplitude: f32,
    },

    /// All layer amplitudes are zero
    #[error("total noise amplitude is zero")]
    ZeroAmplitude,

    /// Noise map scale must be positive
    #[error("map scale must be positive, got {0}")]
    NonPositiveScale(f32),

    /// No terrain bands were supplied
    #[error("terrain band list is empty")]
    EmptyBands,

    /// Bands are not sorted by ascending upper bound
    #[error("terrain band {index} ({name}) is out of ascending order")]
    UnsortedBands {
        /// Band index
        index: usize,
        /// Band name
        name: String,
    },

    /// A band name was looked up but not found
    #[error("no terrain band named {0:?}")]
    UnknownBand(String),

    /// Carving scale factor must be at least one texel per cell
    #[error("carve scale must be a positive integer")]
    ZeroCarveScale,

    /// Coverage target outside [0, 1]
    #[error("minimum path coverage must be within [0, 1], got {0}")]
    InvalidCoverage(f32),

    /// Carving grid is too small to hold the start cell and its walls
    #[error("carve grid {rows}x{cols} is too small (minimum 3x3)")]
    GridTooSmall {
        /// Rows in carving units
        rows: usize,
        /// Columns in carving units
        cols: usize,
    },

    /// Tiles need at least two texels per side
    #[error("tile resolution must be at least 2, got {0}")]
    TileResolution(usize),

    /// Tile world size must be positive
    #[error("tile world size must be positive, got {width}x{depth}")]
    TileExtent {
        /// World width
        width: f32,
        /// World depth
        depth: f32,
    },

    /// A bounded level needs at least one tile
    #[error("level must be at least 1x1 tiles, got {depth}x{width}")]
    EmptyLevel {
        /// Tiles along Z
        depth: usize,
        /// Tiles along X
        width: usize,
    },

    /// Deferred construction needs at least one worker
    #[error("worker count must be positive")]
    NoWorkers,
}

/// Result type alias for Pathland operations.
pub type PathlandResult<T> = Result<T, PathlandError>;
