//! Layered noise height fields.
//!
//! A height sample is the amplitude-weighted average of several Perlin
//! layers, each with its own frequency and coordinate shift ("seed").
//! Output is a pure function of the inputs so that adjacent tiles sampled
//! with matching offsets meet without seams.

use ::noise::{NoiseFn, Perlin};
use pathland_common::ConfigError;
use serde::{Deserialize, Serialize};

/// Permutation seed used when none is given.
pub const DEFAULT_PERLIN_SEED: u32 = 0;

/// Upper bound (exclusive) for randomized layer seeds.
pub const MAX_LAYER_SEED: u32 = 10_000;

/// One periodic signal contributing to a height sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayer {
    /// Coordinate shift applied after frequency scaling
    pub seed: f32,
    /// Sample-space frequency multiplier
    pub frequency: f32,
    /// Weight of this layer in the normalized sum
    pub amplitude: f32,
}

impl NoiseLayer {
    /// Creates a new layer.
    #[must_use]
    pub const fn new(seed: f32, frequency: f32, amplitude: f32) -> Self {
        Self {
            seed,
            frequency,
            amplitude,
        }
    }
}

/// Immutable 2D grid of height samples, indexed `(row, col)` = `(z, x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    depth: usize,
    width: usize,
    values: Vec<f32>,
}

impl HeightGrid {
    /// Builds a grid from row-major values.
    ///
    /// Returns `None` if `values.len() != depth * width`.
    #[must_use]
    pub fn from_values(depth: usize, width: usize, values: Vec<f32>) -> Option<Self> {
        (values.len() == depth * width).then_some(Self {
            depth,
            width,
            values,
        })
    }

    /// Number of rows (Z samples).
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Number of columns (X samples).
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Sample at `(row, col)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.depth || col >= self.width {
            return None;
        }
        self.values.get(row * self.width + col).copied()
    }

    /// Row-major samples.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Smallest and largest sample, or `None` for an empty grid.
    #[must_use]
    pub fn range(&self) -> Option<(f32, f32)> {
        let first = *self.values.first()?;
        Some(
            self.values
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

/// Normalized multi-layer Perlin field.
///
/// Every sample lies in `[0, 1]`, the range of the underlying
/// [`periodic_noise`].
#[derive(Clone)]
pub struct NoiseField {
    layers: Vec<NoiseLayer>,
    total_amplitude: f32,
    perlin: Perlin,
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField")
            .field("layers", &self.layers)
            .field("total_amplitude", &self.total_amplitude)
            .finish_non_exhaustive()
    }
}

impl NoiseField {
    /// Creates a field from a layer recipe using the default permutation.
    pub fn new(layers: Vec<NoiseLayer>) -> Result<Self, ConfigError> {
        Self::with_perlin_seed(layers, DEFAULT_PERLIN_SEED)
    }

    /// Creates a field with an explicit Perlin permutation seed.
    pub fn with_perlin_seed(layers: Vec<NoiseLayer>, perlin_seed: u32) -> Result<Self, ConfigError> {
        let total_amplitude = validate_layers(&layers)?;
        Ok(Self {
            layers,
            total_amplitude,
            perlin: Perlin::new(perlin_seed),
        })
    }

    /// The layer recipe.
    #[must_use]
    pub fn layers(&self) -> &[NoiseLayer] {
        &self.layers
    }

    /// Sum of all layer amplitudes (always positive).
    #[must_use]
    pub const fn total_amplitude(&self) -> f32 {
        self.total_amplitude
    }

    /// Reassigns every layer seed to a random integer in `[0, MAX_LAYER_SEED)`.
    pub fn randomize_seeds(&mut self, rng: &mut fastrand::Rng) {
        for layer in &mut self.layers {
            layer.seed = rng.u32(0..MAX_LAYER_SEED) as f32;
        }
    }

    /// Evaluates the normalized layer stack at sample-space `(x, z)`.
    #[must_use]
    pub fn sample(&self, x: f32, z: f32) -> f32 {
        let sum: f32 = self
            .layers
            .iter()
            .map(|layer| {
                let nx = x * layer.frequency + layer.seed;
                let nz = z * layer.frequency + layer.seed;
                layer.amplitude * periodic_noise(&self.perlin, nx, nz)
            })
            .sum();
        sum / self.total_amplitude
    }

    /// Generates a `depth x width` grid.
    ///
    /// Cell `(z, x)` samples `((x + offset_x) / scale, (z + offset_z) / scale)`.
    pub fn generate(
        &self,
        depth: usize,
        width: usize,
        scale: f32,
        offset_x: f32,
        offset_z: f32,
    ) -> Result<HeightGrid, ConfigError> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(ConfigError::NonPositiveScale(scale));
        }
        Ok(self.fill(depth, width, scale, offset_x, offset_z))
    }

    /// Grid generation without the scale check; `scale` must be positive.
    pub(crate) fn fill(
        &self,
        depth: usize,
        width: usize,
        scale: f32,
        offset_x: f32,
        offset_z: f32,
    ) -> HeightGrid {
        let mut values = Vec::with_capacity(depth * width);
        for z in 0..depth {
            for x in 0..width {
                let sample_x = (x as f32 + offset_x) / scale;
                let sample_z = (z as f32 + offset_z) / scale;
                values.push(self.sample(sample_x, sample_z));
            }
        }

        HeightGrid {
            depth,
            width,
            values,
        }
    }
}

/// One-shot generation with a throwaway field.
pub fn generate(
    depth: usize,
    width: usize,
    scale: f32,
    offset_x: f32,
    offset_z: f32,
    layers: &[NoiseLayer],
) -> Result<HeightGrid, ConfigError> {
    NoiseField::new(layers.to_vec())?.generate(depth, width, scale, offset_x, offset_z)
}

/// Smooth, deterministic 2D noise in `[0, 1]`.
///
/// The native range is defined by remapping Perlin's `[-1, 1]` output as
/// `(raw + 1) / 2`. Layer sums built from it are normalized, never clamped.
#[must_use]
pub fn periodic_noise(perlin: &Perlin, x: f32, z: f32) -> f32 {
    let raw = perlin.get([f64::from(x), f64::from(z)]);
    ((raw + 1.0) * 0.5).clamp(0.0, 1.0) as f32
}

fn validate_layers(layers: &[NoiseLayer]) -> Result<f32, ConfigError> {
    if layers.is_empty() {
        return Err(ConfigError::NoLayers);
    }
    for (index, layer) in layers.iter().enumerate() {
        if !(layer.amplitude >= 0.0 && layer.amplitude.is_finite()) {
            return Err(ConfigError::InvalidAmplitude {
                index,
                amplitude: layer.amplitude,
            });
        }
    }
    let total: f32 = layers.iter().map(|l| l.amplitude).sum();
    if total <= 0.0 {
        return Err(ConfigError::ZeroAmplitude);
    }
    Ok(total)
}
