//! Tile assembly: height samples, mesh elevations, and the color texture.

use std::sync::Arc;

use pathland_common::{ConfigError, GridPoint, TileCoord, TileExtent};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::maze::{MazeTile, PathMap, PathQuery};
use crate::noise::{HeightGrid, NoiseField};
use crate::terrain::{Rgba, TerrainPalette};

/// Piecewise-linear remapping of a height sample before it becomes a
/// mesh elevation.
///
/// Keys are `[input, output]` pairs sorted by input. Inputs outside the key
/// range take the nearest key's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<[f32; 2]>", into = "Vec<[f32; 2]>")]
pub struct HeightCurve {
    keys: Vec<[f32; 2]>,
}

impl HeightCurve {
    /// Builds a curve from keys in any order. NaN keys are dropped.
    #[must_use]
    pub fn new(mut keys: Vec<[f32; 2]>) -> Self {
        keys.retain(|[x, y]| !x.is_nan() && !y.is_nan());
        keys.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Self { keys }
    }

    /// The identity curve over `[0, 1]`.
    #[must_use]
    pub fn linear() -> Self {
        Self::new(vec![[0.0, 0.0], [1.0, 1.0]])
    }

    /// Sorted keys.
    #[must_use]
    pub fn keys(&self) -> &[[f32; 2]] {
        &self.keys
    }

    /// Evaluates the curve. An empty curve is the identity.
    #[must_use]
    pub fn evaluate(&self, t: f32) -> f32 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return t,
        };
        if t <= first[0] {
            return first[1];
        }
        if t >= last[0] {
            return last[1];
        }
        for pair in self.keys.windows(2) {
            let ([x0, y0], [x1, y1]) = (pair[0], pair[1]);
            if t <= x1 {
                let span = x1 - x0;
                if span <= f32::EPSILON {
                    return y1;
                }
                return y0 + (y1 - y0) * (t - x0) / span;
            }
        }
        last[1]
    }
}

impl Default for HeightCurve {
    fn default() -> Self {
        Self::linear()
    }
}

impl From<Vec<[f32; 2]>> for HeightCurve {
    fn from(keys: Vec<[f32; 2]>) -> Self {
        Self::new(keys)
    }
}

impl From<HeightCurve> for Vec<[f32; 2]> {
    fn from(curve: HeightCurve) -> Self {
        curve.keys
    }
}

/// Per-tile size and shaping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileParams {
    /// Samples (and texels) per tile side
    pub resolution: usize,
    /// World-space footprint
    pub extent: TileExtent,
    /// Noise sample-space scale
    pub map_scale: f32,
    /// Elevation of a curve output of 1.0
    pub height_multiplier: f32,
    /// Height-to-elevation remapping
    pub curve: HeightCurve,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            resolution: 11,
            extent: TileExtent::new(10.0, 10.0),
            map_scale: 3.0,
            height_multiplier: 3.0,
            curve: HeightCurve::linear(),
        }
    }
}

impl TileParams {
    /// Checks the parameters describe a buildable tile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution < 2 {
            return Err(ConfigError::TileResolution(self.resolution));
        }
        let TileExtent { width, depth } = self.extent;
        if !(width > 0.0 && depth > 0.0) {
            return Err(ConfigError::TileExtent { width, depth });
        }
        if !(self.map_scale > 0.0 && self.map_scale.is_finite()) {
            return Err(ConfigError::NonPositiveScale(self.map_scale));
        }
        Ok(())
    }
}

/// One generated unit of terrain.
///
/// Owns its height samples, per-vertex elevations, and color texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    coord: TileCoord,
    heights: HeightGrid,
    elevations: Vec<f32>,
    texture: Vec<Rgba>,
    path_texels: usize,
}

impl Tile {
    /// World tile coordinate.
    #[must_use]
    pub const fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Samples (texels) per side.
    #[must_use]
    pub const fn resolution(&self) -> usize {
        self.heights.width()
    }

    /// Raw height samples.
    #[must_use]
    pub fn heights(&self) -> &HeightGrid {
        &self.heights
    }

    /// Mesh elevations, row-major, one per height sample.
    #[must_use]
    pub fn elevations(&self) -> &[f32] {
        &self.elevations
    }

    /// Texture texels, row-major, one per height sample.
    #[must_use]
    pub fn texture(&self) -> &[Rgba] {
        &self.texture
    }

    /// Texture as tightly packed RGBA8 bytes.
    #[must_use]
    pub fn texture_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texture)
    }

    /// Texels currently painted as path.
    #[must_use]
    pub const fn path_texels(&self) -> usize {
        self.path_texels
    }

    /// Texel color at `(row, col)`.
    #[must_use]
    pub fn texel(&self, row: usize, col: usize) -> Option<Rgba> {
        let res = self.resolution();
        if row >= res || col >= res {
            return None;
        }
        self.texture.get(row * res + col).copied()
    }
}

/// Builds tiles from a noise recipe and a terrain palette.
///
/// Building is deterministic: the same coordinate always yields an
/// identical tile. Tile `(row, col)` samples with offsets
/// `col * (res - 1)` and `row * (res - 1)` so that edge samples are shared
/// with the neighboring tile.
#[derive(Debug, Clone)]
pub struct TileBuilder {
    noise: NoiseField,
    palette: TerrainPalette,
    params: TileParams,
}

impl TileBuilder {
    /// Creates a builder after validating the tile parameters.
    pub fn new(noise: NoiseField, palette: TerrainPalette, params: TileParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            noise,
            palette,
            params,
        })
    }

    /// Noise recipe.
    #[must_use]
    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Terrain palette.
    #[must_use]
    pub fn palette(&self) -> &TerrainPalette {
        &self.palette
    }

    /// Tile parameters.
    #[must_use]
    pub fn params(&self) -> &TileParams {
        &self.params
    }

    /// Generates the tile at `coord`.
    #[must_use]
    pub fn build(&self, coord: TileCoord) -> Tile {
        let res = self.params.resolution;
        let step = (res - 1) as f32;
        let offset_x = coord.col as f32 * step;
        let offset_z = coord.row as f32 * step;

        let heights = self
            .noise
            .fill(res, res, self.params.map_scale, offset_x, offset_z);

        let texture = heights
            .values()
            .iter()
            .map(|&h| self.palette.classify(h).color)
            .collect();
        let elevations = heights
            .values()
            .iter()
            .map(|&h| self.params.curve.evaluate(h) * self.params.height_multiplier)
            .collect();

        trace!("Built tile {coord}");
        Tile {
            coord,
            heights,
            elevations,
            texture,
            path_texels: 0,
        }
    }
}

/// Paints carved paths onto tile textures.
///
/// Texel `(z, x)` of tile `(row, col)` corresponds to fine path coordinate
/// `(row * res + z, col * res + x)`.
#[derive(Debug)]
pub struct PathOverlay<M = PathMap> {
    map: Arc<M>,
    color: Rgba,
}

impl<M> Clone for PathOverlay<M> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
            color: self.color,
        }
    }
}

impl<M: PathQuery> PathOverlay<M> {
    /// Creates an overlay over a shared path source.
    #[must_use]
    pub fn new(map: Arc<M>, color: Rgba) -> Self {
        Self { map, color }
    }

    /// The shared path source.
    #[must_use]
    pub fn map(&self) -> &Arc<M> {
        &self.map
    }

    /// Paint color.
    #[must_use]
    pub const fn color(&self) -> Rgba {
        self.color
    }

    /// Path query for one texel of a tile.
    #[must_use]
    pub fn tile_at(&self, coord: TileCoord, res: usize, row: usize, col: usize) -> MazeTile {
        let origin = coord.fine_origin(res);
        self.map
            .tile_at(origin.offset(row as i64, col as i64))
    }

    /// Paints every path texel of `tile`. Returns the number of path texels.
    pub fn paint(&self, tile: &mut Tile) -> usize {
        let res = tile.resolution();
        let origin: GridPoint = tile.coord.fine_origin(res);
        let mut painted = 0;
        for row in 0..res {
            for col in 0..res {
                let fine = origin.offset(row as i64, col as i64);
                if self.map.tile_at(fine) == MazeTile::Path {
                    tile.texture[row * res + col] = self.color;
                    painted += 1;
                }
            }
        }
        tile.path_texels = painted;
        painted
    }
}
