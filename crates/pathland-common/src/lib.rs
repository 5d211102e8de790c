//! # Pathland Common
//!
//! Common types shared across Pathland subsystems:
//! - Coordinate types (tile, fine grid, world extent)
//! - Error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
}

pub use prelude::*;
