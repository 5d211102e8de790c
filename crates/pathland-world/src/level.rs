//! Bounded pathed levels.
//!
//! A level is a fixed `depth x width` block of tiles with one maze carved
//! across all of them. Carving sees the tiles as a single fine grid of
//! `depth * res` by `width * res` texels, so paths run continuously from
//! tile to tile.

use std::sync::Arc;

use pathland_common::{ConfigError, GridPoint, TileCoord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::maze::{carve, CarveReport, CarveSettings, HeightGate, HeightSource, MazeTile, PathMap};
use crate::terrain::Rgba;
use crate::tile::{PathOverlay, Tile, TileBuilder};

/// Default color painted over path texels.
pub const DEFAULT_PATH_COLOR: Rgba = Rgba::rgb(196, 164, 120);

/// Level layout and carving parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    /// Tiles along Z
    pub depth_tiles: usize,
    /// Tiles along X
    pub width_tiles: usize,
    /// Texels per carving cell side
    pub carve_scale: usize,
    /// Coverage fraction below which the carver re-seeds
    pub min_coverage: f32,
    /// Maximum re-seeds
    pub retry_budget: u32,
    /// Carving RNG seed
    pub carve_seed: u64,
    /// Terrain band at and above which no path may be carved
    pub impassable_band: Option<String>,
    /// Path texel color
    pub path_color: Rgba,
}

impl Default for LevelSettings {
    fn default() -> Self {
        let carve = CarveSettings::default();
        Self {
            depth_tiles: 3,
            width_tiles: 3,
            carve_scale: carve.scale,
            min_coverage: carve.min_coverage,
            retry_budget: carve.retry_budget,
            carve_seed: carve.seed,
            impassable_band: None,
            path_color: DEFAULT_PATH_COLOR,
        }
    }
}

/// Height samples of a row-major block of tiles, addressed in fine
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TiledHeights<'a> {
    tiles: &'a [Tile],
    width_tiles: usize,
    resolution: usize,
}

impl<'a> TiledHeights<'a> {
    /// Wraps `tiles`, laid out `width_tiles` per row.
    #[must_use]
    pub fn new(tiles: &'a [Tile], width_tiles: usize, resolution: usize) -> Self {
        Self {
            tiles,
            width_tiles,
            resolution,
        }
    }
}

impl HeightSource for TiledHeights<'_> {
    fn height_at(&self, fine: GridPoint) -> Option<f32> {
        let row = usize::try_from(fine.row).ok()?;
        let col = usize::try_from(fine.col).ok()?;
        let res = self.resolution;
        let (tile_row, tile_col) = (row / res, col / res);
        if tile_col >= self.width_tiles {
            return None;
        }
        self.tiles
            .get(tile_row * self.width_tiles + tile_col)?
            .heights()
            .get(row % res, col % res)
    }
}

/// A finite block of tiles with a carved path network painted on.
#[derive(Debug, Clone)]
pub struct PathedLevel {
    depth_tiles: usize,
    width_tiles: usize,
    tiles: Vec<Tile>,
    overlay: PathOverlay,
}

impl PathedLevel {
    /// Builds every tile, carves one maze across the whole level, and
    /// paints it onto the tile textures.
    pub fn generate(builder: &TileBuilder, settings: &LevelSettings) -> Result<Self, ConfigError> {
        let (depth, width) = (settings.depth_tiles, settings.width_tiles);
        if depth == 0 || width == 0 {
            return Err(ConfigError::EmptyLevel { depth, width });
        }
        if settings.carve_scale == 0 {
            return Err(ConfigError::ZeroCarveScale);
        }

        let threshold = settings
            .impassable_band
            .as_deref()
            .map(|name| builder.palette().threshold(name))
            .transpose()?;

        let mut tiles: Vec<Tile> = (0..depth)
            .flat_map(|row| (0..width).map(move |col| TileCoord::new(row as i32, col as i32)))
            .map(|coord| builder.build(coord))
            .collect();

        let res = builder.params().resolution;
        let carve_settings = CarveSettings {
            min_coverage: settings.min_coverage,
            retry_budget: settings.retry_budget,
            seed: settings.carve_seed,
            ..CarveSettings::covering(depth * res, width * res, settings.carve_scale)
        };

        let heights = TiledHeights::new(&tiles, width, res);
        let gate = threshold.map(|cutoff| HeightGate::new(&heights, cutoff));
        let map = carve(carve_settings, gate.as_ref())?;

        let overlay = PathOverlay::new(Arc::new(map), settings.path_color);
        let painted: usize = tiles.iter_mut().map(|tile| overlay.paint(tile)).sum();

        info!(
            "Generated {depth}x{width} tile level, {painted} path texels across {} tiles",
            tiles.len()
        );
        Ok(Self {
            depth_tiles: depth,
            width_tiles: width,
            tiles,
            overlay,
        })
    }

    /// Tiles along Z.
    #[must_use]
    pub const fn depth_tiles(&self) -> usize {
        self.depth_tiles
    }

    /// Tiles along X.
    #[must_use]
    pub const fn width_tiles(&self) -> usize {
        self.width_tiles
    }

    /// All tiles, row-major.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Tile at level position `(row, col)`.
    #[must_use]
    pub fn tile(&self, row: usize, col: usize) -> Option<&Tile> {
        if col >= self.width_tiles {
            return None;
        }
        self.tiles.get(row * self.width_tiles + col)
    }

    /// Height samples of the whole level in fine coordinates.
    #[must_use]
    pub fn heights(&self) -> TiledHeights<'_> {
        TiledHeights::new(&self.tiles, self.width_tiles, self.resolution())
    }

    /// Texels per tile side.
    #[must_use]
    pub fn resolution(&self) -> usize {
        self.tiles.first().map_or(0, Tile::resolution)
    }

    /// The carved maze.
    #[must_use]
    pub fn path_map(&self) -> &Arc<PathMap> {
        self.overlay.map()
    }

    /// Overlay used to paint the tiles.
    #[must_use]
    pub fn overlay(&self) -> &PathOverlay {
        &self.overlay
    }

    /// Carve summary.
    #[must_use]
    pub fn report(&self) -> &CarveReport {
        self.path_map().report()
    }

    /// Path state at a fine coordinate.
    #[must_use]
    pub fn tile_at(&self, fine: GridPoint) -> MazeTile {
        self.path_map().tile_at(fine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{NoiseField, NoiseLayer};
    use crate::terrain::TerrainPalette;
    use crate::tile::TileParams;

    fn builder() -> TileBuilder {
        let noise = NoiseField::new(vec![
            NoiseLayer::new(4.0, 1.0, 1.0),
            NoiseLayer::new(9.0, 2.0, 0.5),
        ])
        .expect("valid layers");
        TileBuilder::new(noise, TerrainPalette::default(), TileParams::default())
            .expect("valid params")
    }

    fn settings() -> LevelSettings {
        LevelSettings {
            depth_tiles: 2,
            width_tiles: 3,
            ..LevelSettings::default()
        }
    }

    #[test]
    fn test_level_layout() {
        let level = PathedLevel::generate(&builder(), &settings()).expect("level");
        assert_eq!(level.tiles().len(), 6);
        assert_eq!(level.resolution(), 11);
        let tile = level.tile(1, 2).expect("tile in range");
        assert_eq!(tile.coord(), TileCoord::new(1, 2));
        assert!(level.tile(0, 3).is_none());
        assert!(level.tile(2, 0).is_none());

        let grid = level.path_map().grid();
        assert_eq!(grid.rows(), 22);
        assert_eq!(grid.cols(), 33);
        assert!(level.report().path_tiles > 0);
    }

    #[test]
    fn test_tiled_heights_addressing() {
        let level = PathedLevel::generate(&builder(), &settings()).expect("level");
        let heights = level.heights();
        let tile = level.tile(1, 1).expect("tile in range");
        assert_eq!(
            heights.height_at(GridPoint::new(11 + 4, 11 + 7)),
            tile.heights().get(4, 7)
        );
        assert_eq!(heights.height_at(GridPoint::new(-1, 0)), None);
        assert_eq!(heights.height_at(GridPoint::new(0, 33)), None);
        assert_eq!(heights.height_at(GridPoint::new(22, 0)), None);
    }

    #[test]
    fn test_overlay_painted_on_every_tile() {
        let level = PathedLevel::generate(&builder(), &settings()).expect("level");
        let mut total = 0;
        for tile in level.tiles() {
            let origin = tile.coord().fine_origin(11);
            let mut expected = 0;
            for row in 0..11 {
                for col in 0..11 {
                    let fine = origin.offset(row as i64, col as i64);
                    if level.tile_at(fine) == MazeTile::Path {
                        expected += 1;
                        assert_eq!(tile.texel(row, col), Some(DEFAULT_PATH_COLOR));
                    }
                }
            }
            assert_eq!(tile.path_texels(), expected);
            total += expected;
        }
        assert_eq!(total, level.report().path_tiles);
    }

    #[test]
    fn test_impassable_band_respected() {
        let settings = LevelSettings {
            impassable_band: Some("dirt".to_string()),
            ..settings()
        };
        let level = PathedLevel::generate(&builder(), &settings).expect("level");
        let cutoff = TerrainPalette::default().threshold("dirt").expect("known band");
        let heights = level.heights();
        for cell in level.path_map().grid().paths() {
            let height = heights.height_at(cell).expect("inside level");
            assert!(height < cutoff);
        }
    }

    #[test]
    fn test_lowest_band_blocks_everything() {
        let settings = LevelSettings {
            impassable_band: Some("water".to_string()),
            ..settings()
        };
        let level = PathedLevel::generate(&builder(), &settings).expect("level");
        assert_eq!(level.report().path_tiles, 0);
        assert!(level.tiles().iter().all(|tile| tile.path_texels() == 0));
    }

    #[test]
    fn test_coarse_carving() {
        let settings = LevelSettings {
            carve_scale: 2,
            ..settings()
        };
        let level = PathedLevel::generate(&builder(), &settings).expect("level");
        let grid = level.path_map().grid();
        assert_eq!(grid.rows(), 11);
        assert_eq!(grid.cols(), 17);
        let painted: usize = level.tiles().iter().map(Tile::path_texels).sum();
        assert!(painted >= level.report().path_tiles);
    }

    #[test]
    fn test_invalid_settings() {
        let err = PathedLevel::generate(
            &builder(),
            &LevelSettings {
                impassable_band: Some("lava".to_string()),
                ..settings()
            },
        )
        .expect_err("unknown band");
        assert_eq!(err, ConfigError::UnknownBand("lava".to_string()));

        let err = PathedLevel::generate(
            &builder(),
            &LevelSettings {
                width_tiles: 0,
                ..settings()
            },
        )
        .expect_err("empty level");
        assert_eq!(err, ConfigError::EmptyLevel { depth: 2, width: 0 });

        let err = PathedLevel::generate(
            &builder(),
            &LevelSettings {
                carve_scale: 0,
                ..settings()
            },
        )
        .expect_err("zero scale");
        assert_eq!(err, ConfigError::ZeroCarveScale);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = PathedLevel::generate(&builder(), &settings()).expect("level");
        let b = PathedLevel::generate(&builder(), &settings()).expect("level");
        assert_eq!(a.tiles(), b.tiles());
        assert_eq!(a.path_map(), b.path_map());
    }
}
