//! Coordinate types for tiles, fine-grained grids, and world space.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Tile coordinate in the world tile grid.
///
/// Rows advance along world +Z (north), columns along world +X (east).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct TileCoord {
    /// Row (Z axis) in tile units
    pub row: i32,
    /// Column (X axis) in tile units
    pub col: i32,
}

impl TileCoord {
    /// The tile at the world origin.
    pub const ORIGIN: Self = Self::new(0, 0);

    /// Creates a new tile coordinate.
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Returns this coordinate moved by the given number of rows and columns.
    #[must_use]
    pub const fn offset(self, rows: i32, cols: i32) -> Self {
        Self {
            row: self.row + rows,
            col: self.col + cols,
        }
    }

    /// Fine-grid point of this tile's first texel, given texels per tile side.
    #[must_use]
    pub const fn fine_origin(self, resolution: usize) -> GridPoint {
        GridPoint {
            row: (self.row as i64) * (resolution as i64),
            col: (self.col as i64) * (resolution as i64),
        }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Point on a discrete 2D grid, indexed `(row, col)`.
///
/// Signed so that queries just outside a grid are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct GridPoint {
    /// Row index
    pub row: i64,
    /// Column index
    pub col: i64,
}

impl GridPoint {
    /// Creates a new grid point.
    #[must_use]
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// Returns this point moved by `(rows, cols)`.
    #[must_use]
    pub const fn offset(self, rows: i64, cols: i64) -> Self {
        Self {
            row: self.row + rows,
            col: self.col + cols,
        }
    }

    /// The four orthogonal neighbors (east, north, west, south).
    #[must_use]
    pub const fn orthogonal(self) -> [Self; 4] {
        [
            self.offset(0, 1),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(-1, 0),
        ]
    }

    /// The four diagonal neighbors.
    #[must_use]
    pub const fn diagonal(self) -> [Self; 4] {
        [
            self.offset(1, 1),
            self.offset(1, -1),
            self.offset(-1, 1),
            self.offset(-1, -1),
        ]
    }
}

/// World-space footprint of one tile on the ground plane.
///
/// Tiles are centered on `(col * width, row * depth)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileExtent {
    /// Size along world X
    pub width: f32,
    /// Size along world Z
    pub depth: f32,
}

impl TileExtent {
    /// Creates a new tile extent.
    #[must_use]
    pub const fn new(width: f32, depth: f32) -> Self {
        Self { width, depth }
    }

    /// World-space center of a tile (Y is always zero).
    #[must_use]
    pub fn center(self, coord: TileCoord) -> Vec3 {
        Vec3::new(
            coord.col as f32 * self.width,
            0.0,
            coord.row as f32 * self.depth,
        )
    }

    /// Minimum and maximum ground-plane corners of a tile.
    #[must_use]
    pub fn bounds(self, coord: TileCoord) -> (Vec3, Vec3) {
        let center = self.center(coord);
        let half = Vec3::new(self.width / 2.0, 0.0, self.depth / 2.0);
        (center - half, center + half)
    }

    /// Tile containing a world position. The Y component is ignored.
    #[must_use]
    pub fn containing(self, position: Vec3) -> TileCoord {
        TileCoord {
            row: (position.z / self.depth + 0.5).floor() as i32,
            col: (position.x / self.width + 0.5).floor() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_rounds_to_centered_tiles() {
        let extent = TileExtent::new(10.0, 10.0);
        assert_eq!(extent.containing(Vec3::ZERO), TileCoord::ORIGIN);
        assert_eq!(extent.containing(Vec3::new(4.9, 3.0, -4.9)), TileCoord::ORIGIN);
        assert_eq!(extent.containing(Vec3::new(5.1, 0.0, 0.0)), TileCoord::new(0, 1));
        assert_eq!(extent.containing(Vec3::new(0.0, 0.0, -5.1)), TileCoord::new(-1, 0));
    }

    #[test]
    fn test_bounds_surround_center() {
        let extent = TileExtent::new(10.0, 20.0);
        let (min, max) = extent.bounds(TileCoord::new(1, 2));
        assert_eq!(min, Vec3::new(15.0, 0.0, 10.0));
        assert_eq!(max, Vec3::new(25.0, 0.0, 30.0));
    }

    #[test]
    fn test_fine_origin() {
        assert_eq!(TileCoord::new(2, -1).fine_origin(11), GridPoint::new(22, -11));
    }
}
