//! Pathland configuration.
//!
//! Every generation parameter in one TOML file. Loading never fails: a
//! missing or broken file falls back to defaults. Conversion into world
//! types is where bad values surface, as [`ConfigError`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use pathland_common::{ConfigError, PathlandResult, TileCoord, TileExtent};
use pathland_world::{
    ConstructionMode, HeightCurve, LevelSettings, NoiseField, NoiseLayer, Rgba, StreamConfig,
    TerrainBand, TerrainPalette, TileBuilder, TileParams, DEFAULT_PATH_COLOR,
    DEFAULT_PERLIN_SEED, DEFAULT_RENDER_DISTANCE, MAX_RENDER_DISTANCE,
};

/// Configuration file name.
const CONFIG_FILE: &str = "pathland.toml";

/// Generation and streaming parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathlandConfig {
    // === Noise ===
    /// Perlin permutation seed
    pub perlin_seed: u32,
    /// Sample-space scale; larger values stretch features
    pub map_scale: f32,
    /// Replace every layer seed with a random one at startup
    pub randomize_seeds: bool,

    // === Terrain ===
    /// Band at and above which paths may not be carved
    pub impassable_band: Option<String>,

    // === Tiles ===
    /// Samples per tile side
    pub tile_resolution: usize,
    /// Tile width along X in world units
    pub tile_width: f32,
    /// Tile depth along Z in world units
    pub tile_depth: f32,
    /// Elevation of a curve output of 1.0
    pub height_multiplier: f32,
    /// `[input, output]` height curve keys
    pub height_curve: Vec<[f32; 2]>,

    // === Paths ===
    /// Coverage fraction below which carving re-seeds (0.0 - 1.0)
    pub min_path_coverage: f32,
    /// Maximum re-seeds per carve
    pub carve_retry_budget: u32,
    /// Texels per carving cell side
    pub carve_scale: usize,
    /// Carving RNG seed
    pub carve_seed: u64,
    /// Path texel color
    pub path_color: Rgba,

    // === Level ===
    /// Level size along Z in tiles
    pub level_depth: usize,
    /// Level size along X in tiles
    pub level_width: usize,

    // === Streaming ===
    /// Render distance in tiles
    pub render_distance: u32,
    /// Background construction workers (0 = build inline)
    pub worker_count: usize,

    // === Tables ===
    /// Noise layers
    pub noise_layers: Vec<NoiseLayer>,
    /// Terrain bands by ascending upper bound
    pub terrain_bands: Vec<TerrainBand>,
}

impl Default for PathlandConfig {
    fn default() -> Self {
        let tile = TileParams::default();
        let level = LevelSettings::default();
        Self {
            // Noise
            perlin_seed: DEFAULT_PERLIN_SEED,
            map_scale: tile.map_scale,
            randomize_seeds: false,

            // Terrain
            impassable_band: Some("stone".to_string()),

            // Tiles
            tile_resolution: tile.resolution,
            tile_width: tile.extent.width,
            tile_depth: tile.extent.depth,
            height_multiplier: tile.height_multiplier,
            height_curve: tile.curve.keys().to_vec(),

            // Paths
            min_path_coverage: level.min_coverage,
            carve_retry_budget: level.retry_budget,
            carve_scale: level.carve_scale,
            carve_seed: level.carve_seed,
            path_color: DEFAULT_PATH_COLOR,

            // Level
            level_depth: level.depth_tiles,
            level_width: level.width_tiles,

            // Streaming
            render_distance: DEFAULT_RENDER_DISTANCE,
            worker_count: 2,

            // Tables
            noise_layers: vec![
                NoiseLayer::new(0.0, 1.0, 1.0),
                NoiseLayer::new(400.0, 2.0, 0.5),
                NoiseLayer::new(800.0, 4.0, 0.25),
            ],
            terrain_bands: TerrainPalette::default().bands().to_vec(),
        }
    }
}

impl PathlandConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> PathlandResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Default configuration file path.
    pub fn config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// Clamp values to supported ranges.
    pub fn validate(&mut self) {
        self.render_distance = self.render_distance.clamp(1, MAX_RENDER_DISTANCE);
        self.min_path_coverage = if self.min_path_coverage.is_nan() {
            0.0
        } else {
            self.min_path_coverage.clamp(0.0, 1.0)
        };
    }

    /// Noise recipe, with seeds randomized if requested.
    pub fn noise_field(&self, rng: &mut fastrand::Rng) -> Result<NoiseField, ConfigError> {
        let mut field = NoiseField::with_perlin_seed(self.noise_layers.clone(), self.perlin_seed)?;
        if self.randomize_seeds {
            field.randomize_seeds(rng);
            info!("Randomized noise seeds: {:?}", field.layers());
        }
        Ok(field)
    }

    /// Terrain palette.
    pub fn palette(&self) -> Result<TerrainPalette, ConfigError> {
        TerrainPalette::new(self.terrain_bands.clone())
    }

    /// World footprint of one tile.
    pub fn tile_extent(&self) -> TileExtent {
        TileExtent::new(self.tile_width, self.tile_depth)
    }

    /// Per-tile parameters.
    pub fn tile_params(&self) -> Result<TileParams, ConfigError> {
        let params = TileParams {
            resolution: self.tile_resolution,
            extent: self.tile_extent(),
            map_scale: self.map_scale,
            height_multiplier: self.height_multiplier,
            curve: HeightCurve::new(self.height_curve.clone()),
        };
        params.validate()?;
        Ok(params)
    }

    /// Tile builder combining noise, palette, and tile parameters.
    pub fn tile_builder(&self, rng: &mut fastrand::Rng) -> Result<TileBuilder, ConfigError> {
        TileBuilder::new(self.noise_field(rng)?, self.palette()?, self.tile_params()?)
    }

    /// Bounded level layout.
    pub fn level_settings(&self) -> LevelSettings {
        LevelSettings {
            depth_tiles: self.level_depth,
            width_tiles: self.level_width,
            carve_scale: self.carve_scale,
            min_coverage: self.min_path_coverage,
            retry_budget: self.carve_retry_budget,
            carve_seed: self.carve_seed,
            impassable_band: self.impassable_band.clone(),
            path_color: self.path_color,
        }
    }

    /// Stream window centered on `center`.
    pub fn stream_config(&self, center: TileCoord) -> StreamConfig {
        let mode = match self.worker_count {
            0 => ConstructionMode::Inline,
            workers => ConstructionMode::Deferred { workers },
        };
        StreamConfig {
            radius: self.render_distance,
            extent: self.tile_extent(),
            center,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PathlandConfig::default();
        assert_eq!(config.tile_resolution, 11);
        assert_eq!(config.render_distance, 2);
        assert_eq!(config.terrain_bands.len(), 6);
        assert_eq!(config.impassable_band.as_deref(), Some("stone"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PathlandConfig::default();

        config.render_distance = 0;
        config.min_path_coverage = 1.5;
        config.validate();
        assert_eq!(config.render_distance, 1);
        assert_eq!(config.min_path_coverage, 1.0);

        config.render_distance = 50;
        config.min_path_coverage = f32::NAN;
        config.validate();
        assert_eq!(config.render_distance, 10);
        assert_eq!(config.min_path_coverage, 0.0);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("pathland.toml");

        let mut config = PathlandConfig::default();
        config.carve_seed = 12345;
        config.level_width = 5;
        config.impassable_band = Some("snow".to_string());
        config.noise_layers.push(NoiseLayer::new(7.0, 8.0, 0.125));

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = PathlandConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = PathlandConfig::load_from("/nonexistent/path/pathland.toml");
        assert_eq!(config, PathlandConfig::default());
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("pathland.toml");
        fs::write(&config_path, "map_scale = \"wide\"").expect("Failed to write file");
        assert_eq!(PathlandConfig::load_from(&config_path), PathlandConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: PathlandConfig =
            toml::from_str("carve_scale = 2\nworker_count = 0").expect("Failed to parse");
        assert_eq!(config.carve_scale, 2);
        assert_eq!(config.tile_resolution, 11);
        assert_eq!(config.stream_config(TileCoord::ORIGIN).mode, ConstructionMode::Inline);
    }

    #[test]
    fn test_world_types_from_config() {
        let config = PathlandConfig::default();
        let mut rng = fastrand::Rng::with_seed(1);
        let builder = config.tile_builder(&mut rng).expect("valid config");
        assert_eq!(builder.params().resolution, 11);
        assert_eq!(builder.noise().layers(), config.noise_layers.as_slice());
        assert_eq!(
            config.stream_config(TileCoord::new(2, 3)).mode,
            ConstructionMode::Deferred { workers: 2 }
        );
        assert_eq!(config.level_settings().impassable_band.as_deref(), Some("stone"));
    }

    #[test]
    fn test_randomized_seeds() {
        let config = PathlandConfig {
            randomize_seeds: true,
            ..PathlandConfig::default()
        };
        let mut rng = fastrand::Rng::with_seed(7);
        let field = config.noise_field(&mut rng).expect("valid layers");
        assert!(field
            .layers()
            .iter()
            .all(|layer| (0.0..10_000.0).contains(&layer.seed) && layer.seed.fract() == 0.0));
    }

    #[test]
    fn test_bad_values_surface_as_config_errors() {
        let mut rng = fastrand::Rng::with_seed(1);

        let config = PathlandConfig {
            noise_layers: Vec::new(),
            ..PathlandConfig::default()
        };
        assert_eq!(config.noise_field(&mut rng).expect_err("no layers"), ConfigError::NoLayers);

        let config = PathlandConfig {
            tile_resolution: 1,
            ..PathlandConfig::default()
        };
        assert_eq!(config.tile_params().expect_err("tiny tiles"), ConfigError::TileResolution(1));

        let config = PathlandConfig {
            terrain_bands: Vec::new(),
            ..PathlandConfig::default()
        };
        assert_eq!(config.palette().expect_err("no bands"), ConfigError::EmptyBands);
    }

    #[test]
    fn test_config_toml_serialization() {
        let config = PathlandConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize");

        assert!(toml_str.contains("map_scale"));
        assert!(toml_str.contains("[[noise_layers]]"));
        assert!(toml_str.contains("[[terrain_bands]]"));
    }
}
