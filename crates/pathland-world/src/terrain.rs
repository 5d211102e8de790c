//! Height-band terrain classification.

use bytemuck::{Pod, Zeroable};
use pathland_common::ConfigError;
use serde::{Deserialize, Serialize};

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Rgba {
    /// Creates an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color with explicit alpha.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// A named terrain band covering heights below `upper_bound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainBand {
    /// Display name
    pub name: String,
    /// Exclusive upper height bound
    pub upper_bound: f32,
    /// Texel color for this band
    pub color: Rgba,
}

impl TerrainBand {
    /// Creates a new band.
    #[must_use]
    pub fn new(name: impl Into<String>, upper_bound: f32, color: Rgba) -> Self {
        Self {
            name: name.into(),
            upper_bound,
            color,
        }
    }
}

/// First band whose bound exceeds `height`, else the last band.
///
/// Returns `None` only for an empty slice.
#[must_use]
pub fn classify(height: f32, bands: &[TerrainBand]) -> Option<&TerrainBand> {
    bands
        .iter()
        .find(|band| height < band.upper_bound)
        .or_else(|| bands.last())
}

/// Validated, ascending list of terrain bands.
///
/// The last band is the catch-all for any height at or above every bound,
/// including NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TerrainBand>", into = "Vec<TerrainBand>")]
pub struct TerrainPalette {
    bands: Vec<TerrainBand>,
}

impl TerrainPalette {
    /// Validates and wraps a band list.
    pub fn new(bands: Vec<TerrainBand>) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::EmptyBands);
        }
        for (index, band) in bands.iter().enumerate() {
            let out_of_order = index > 0 && band.upper_bound < bands[index - 1].upper_bound;
            if band.upper_bound.is_nan() || out_of_order {
                return Err(ConfigError::UnsortedBands {
                    index,
                    name: band.name.clone(),
                });
            }
        }
        Ok(Self { bands })
    }

    /// Bands in ascending order.
    #[must_use]
    pub fn bands(&self) -> &[TerrainBand] {
        &self.bands
    }

    /// The band a height falls in. Total over all `f32` inputs.
    #[must_use]
    pub fn classify(&self, height: f32) -> &TerrainBand {
        self.bands
            .iter()
            .find(|band| height < band.upper_bound)
            .unwrap_or(&self.bands[self.bands.len() - 1])
    }

    /// Looks up a band by name.
    #[must_use]
    pub fn band(&self, name: &str) -> Option<&TerrainBand> {
        self.bands.iter().find(|band| band.name == name)
    }

    /// Lower height bound of the named band: the first height classified
    /// into it. Used as the impassable cutoff for path carving.
    pub fn threshold(&self, name: &str) -> Result<f32, ConfigError> {
        let index = self
            .bands
            .iter()
            .position(|band| band.name == name)
            .ok_or_else(|| ConfigError::UnknownBand(name.to_string()))?;
        Ok(match index {
            0 => f32::NEG_INFINITY,
            i => self.bands[i - 1].upper_bound,
        })
    }
}

impl Default for TerrainPalette {
    fn default() -> Self {
        Self {
            bands: vec![
                TerrainBand::new("water", 0.3, Rgba::rgb(54, 103, 199)),
                TerrainBand::new("sand", 0.35, Rgba::rgb(210, 208, 125)),
                TerrainBand::new("grass", 0.6, Rgba::rgb(86, 152, 23)),
                TerrainBand::new("dirt", 0.7, Rgba::rgb(120, 84, 52)),
                TerrainBand::new("stone", 0.85, Rgba::rgb(128, 128, 128)),
                TerrainBand::new("snow", 1.0, Rgba::rgb(245, 245, 250)),
            ],
        }
    }
}

impl TryFrom<Vec<TerrainBand>> for TerrainPalette {
    type Error = ConfigError;

    fn try_from(bands: Vec<TerrainBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<TerrainPalette> for Vec<TerrainBand> {
    fn from(palette: TerrainPalette) -> Self {
        palette.bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_bands() -> TerrainPalette {
        TerrainPalette::new(vec![
            TerrainBand::new("low", 0.3, Rgba::rgb(0, 0, 255)),
            TerrainBand::new("mid", 0.6, Rgba::rgb(0, 255, 0)),
            TerrainBand::new("high", 1.0, Rgba::rgb(255, 255, 255)),
        ])
        .expect("sorted bands")
    }

    #[test]
    fn test_classify_ordering() {
        let palette = three_bands();
        assert_eq!(palette.classify(0.2).name, "low");
        // strict less-than: a height equal to a bound belongs to the next band
        assert_eq!(palette.classify(0.3).name, "mid");
        assert_eq!(palette.classify(0.99).name, "high");
        assert_eq!(palette.classify(1.5).name, "high");
    }

    #[test]
    fn test_classify_total() {
        let palette = three_bands();
        assert_eq!(palette.classify(-4.0).name, "low");
        assert_eq!(palette.classify(f32::NAN).name, "high");
        assert_eq!(palette.classify(f32::INFINITY).name, "high");
    }

    #[test]
    fn test_free_classify_matches_palette() {
        let palette = three_bands();
        for h in [-1.0, 0.0, 0.29, 0.3, 0.45, 0.6, 0.9, 2.0] {
            assert_eq!(classify(h, palette.bands()), Some(palette.classify(h)));
        }
        assert!(classify(0.5, &[]).is_none());
    }

    #[test]
    fn test_palette_validation() {
        assert_eq!(TerrainPalette::new(Vec::new()), Err(ConfigError::EmptyBands));
        let unsorted = vec![
            TerrainBand::new("a", 0.5, Rgba::rgb(0, 0, 0)),
            TerrainBand::new("b", 0.2, Rgba::rgb(0, 0, 0)),
        ];
        assert!(matches!(
            TerrainPalette::new(unsorted),
            Err(ConfigError::UnsortedBands { index: 1, .. })
        ));
    }

    #[test]
    fn test_threshold_lookup() {
        let palette = three_bands();
        assert_eq!(palette.threshold("high"), Ok(0.6));
        assert_eq!(palette.threshold("low"), Ok(f32::NEG_INFINITY));
        assert_eq!(
            palette.threshold("lava"),
            Err(ConfigError::UnknownBand("lava".into()))
        );
        assert_eq!(palette.band("mid").map(|b| b.upper_bound), Some(0.6));
    }

    #[test]
    fn test_default_palette_is_valid() {
        let palette = TerrainPalette::default();
        assert!(TerrainPalette::new(palette.bands().to_vec()).is_ok());
        assert_eq!(palette.classify(0.1).name, "water");
        assert_eq!(palette.classify(0.9).name, "snow");
    }
}
