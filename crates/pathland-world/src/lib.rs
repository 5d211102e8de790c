//! # Pathland World
//!
//! Terrain and path generation for Pathland.
//!
//! This crate handles:
//! - Layered Perlin height fields
//! - Terrain band classification
//! - Randomized path carving with terrain gating
//! - Tile assembly and path overlays
//! - Bounded pathed levels
//! - Streaming a tile window around a moving observer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod level;
pub mod maze;
pub mod noise;
pub mod streaming;
pub mod terrain;
pub mod tile;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::level::*;
    pub use crate::maze::*;
    pub use crate::noise::*;
    pub use crate::streaming::*;
    pub use crate::terrain::*;
    pub use crate::tile::*;
}

pub use prelude::*;
