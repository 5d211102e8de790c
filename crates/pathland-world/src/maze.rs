//! Randomized depth-first path carving.
//!
//! The carver starts from an all-wall grid and grows a single-cell-wide,
//! tree-shaped path network from `(1, 1)`:
//!
//! 1. Pop a candidate cell from the stack.
//! 2. Carve it only if at least three of its in-bounds orthogonal neighbors
//!    are walls, no diagonal path cell touches it without a shared
//!    orthogonal path cell, and (optionally) its terrain is below the
//!    impassable height.
//! 3. Push its in-bounds orthogonal neighbors in a freshly shuffled order.
//!
//! A single seed usually stalls well short of filling the grid, so when the
//! stack runs dry below the coverage target a random interior cell is
//! pushed as a new seed, up to a fixed retry budget. Missing the target is a
//! reported outcome, not an error.

use std::fmt;

use pathland_common::{ConfigError, GridPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::noise::HeightGrid;

/// Fixed starting cell for every carve.
pub const START_CELL: GridPoint = GridPoint::new(1, 1);

/// State of one cell in a maze grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MazeTile {
    /// Walkable
    Path,
    /// Blocked
    Wall,
    /// Outside the grid
    Invalid,
}

impl MazeTile {
    /// Character used in text dumps.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Path => 'O',
            Self::Wall => 'X',
            Self::Invalid => '?',
        }
    }
}

/// Rectangular grid of path/wall cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MazeGrid {
    rows: usize,
    cols: usize,
    cells: Vec<MazeTile>,
}

impl MazeGrid {
    /// Creates a grid filled with walls.
    #[must_use]
    pub fn walls(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![MazeTile::Wall; rows * cols],
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    #[must_use]
    pub const fn total_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether a point lies inside the grid. Edge cells count as inside.
    #[must_use]
    pub fn contains(&self, point: GridPoint) -> bool {
        self.index(point).is_some()
    }

    /// Cell state, or [`MazeTile::Invalid`] outside the grid.
    #[must_use]
    pub fn get(&self, point: GridPoint) -> MazeTile {
        self.index(point)
            .map_or(MazeTile::Invalid, |index| self.cells[index])
    }

    /// Whether the cell is a path.
    #[must_use]
    pub fn is_path(&self, point: GridPoint) -> bool {
        self.get(point) == MazeTile::Path
    }

    /// Number of path cells.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.cells.iter().filter(|&&t| t == MazeTile::Path).count()
    }

    /// All path cells in row-major order.
    pub fn paths(&self) -> impl Iterator<Item = GridPoint> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == MazeTile::Path)
            .map(move |(i, _)| GridPoint::new((i / cols) as i64, (i % cols) as i64))
    }

    fn set(&mut self, point: GridPoint, tile: MazeTile) {
        if let Some(index) = self.index(point) {
            self.cells[index] = tile;
        }
    }

    fn index(&self, point: GridPoint) -> Option<usize> {
        let row = usize::try_from(point.row).ok()?;
        let col = usize::try_from(point.col).ok()?;
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }
}

impl fmt::Display for MazeGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.cols.max(1)) {
            for tile in row {
                write!(f, "{}", tile.symbol())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Maps between fine (texel) coordinates and carving cells.
///
/// One carving cell covers a `scale x scale` block of texels on the same
/// axes. The representative texel of a cell is the center of its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarveResolution {
    scale: usize,
}

impl CarveResolution {
    /// Creates a resolution with `scale` texels per carving cell side.
    pub fn new(scale: usize) -> Result<Self, ConfigError> {
        if scale == 0 {
            return Err(ConfigError::ZeroCarveScale);
        }
        Ok(Self { scale })
    }

    /// Texels per carving cell side.
    #[must_use]
    pub const fn scale(self) -> usize {
        self.scale
    }

    /// Carving cell containing a fine coordinate.
    #[must_use]
    pub const fn to_carve(self, fine: GridPoint) -> GridPoint {
        let scale = self.scale as i64;
        GridPoint::new(fine.row.div_euclid(scale), fine.col.div_euclid(scale))
    }

    /// Center texel of a carving cell.
    #[must_use]
    pub const fn to_fine(self, cell: GridPoint) -> GridPoint {
        let scale = self.scale as i64;
        let half = scale / 2;
        GridPoint::new(cell.row * scale + half, cell.col * scale + half)
    }

    /// Number of carving cells needed to cover `fine` texels.
    #[must_use]
    pub fn cells_for(self, fine: usize) -> usize {
        fine.div_ceil(self.scale)
    }
}

/// Terrain height lookup in fine (texel) coordinates.
pub trait HeightSource {
    /// Height at a fine coordinate, or `None` where no terrain exists.
    fn height_at(&self, fine: GridPoint) -> Option<f32>;
}

impl HeightSource for HeightGrid {
    fn height_at(&self, fine: GridPoint) -> Option<f32> {
        let row = usize::try_from(fine.row).ok()?;
        let col = usize::try_from(fine.col).ok()?;
        self.get(row, col)
    }
}

/// Rejects carving where terrain is at or above an impassable height.
#[derive(Clone, Copy)]
pub struct HeightGate<'a> {
    source: &'a dyn HeightSource,
    impassable: f32,
}

impl<'a> HeightGate<'a> {
    /// Creates a gate over a height source.
    #[must_use]
    pub fn new(source: &'a dyn HeightSource, impassable: f32) -> Self {
        Self { source, impassable }
    }

    /// The cutoff height.
    #[must_use]
    pub const fn impassable(&self) -> f32 {
        self.impassable
    }

    /// Whether the terrain at a fine coordinate blocks carving.
    ///
    /// Coordinates without terrain data never block.
    #[must_use]
    pub fn blocks(&self, fine: GridPoint) -> bool {
        self.source
            .height_at(fine)
            .is_some_and(|height| height >= self.impassable)
    }
}

impl fmt::Debug for HeightGate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeightGate")
            .field("impassable", &self.impassable)
            .finish_non_exhaustive()
    }
}

/// Carving parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarveSettings {
    /// Grid rows in carving units
    pub rows: usize,
    /// Grid columns in carving units
    pub cols: usize,
    /// Texels per carving cell side
    pub scale: usize,
    /// Coverage fraction below which the carver re-seeds
    pub min_coverage: f32,
    /// Maximum number of re-seeds
    pub retry_budget: u32,
    /// RNG seed for neighbor shuffling and re-seed placement
    pub seed: u64,
}

impl Default for CarveSettings {
    fn default() -> Self {
        Self {
            rows: 11,
            cols: 11,
            scale: 1,
            min_coverage: 0.4,
            retry_budget: 20,
            seed: 0,
        }
    }
}

impl CarveSettings {
    /// Settings sized to cover a fine grid of `fine_rows x fine_cols` texels.
    #[must_use]
    pub fn covering(fine_rows: usize, fine_cols: usize, scale: usize) -> Self {
        let scale = scale.max(1);
        Self {
            rows: fine_rows.div_ceil(scale),
            cols: fine_cols.div_ceil(scale),
            scale,
            ..Self::default()
        }
    }

    /// Checks the settings can drive a carve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale == 0 {
            return Err(ConfigError::ZeroCarveScale);
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(ConfigError::InvalidCoverage(self.min_coverage));
        }
        if self.rows < 3 || self.cols < 3 {
            return Err(ConfigError::GridTooSmall {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}

/// Why a candidate cell was not carved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Cell is already a path
    AlreadyPath,
    /// Fewer than three orthogonal walls
    TooFewWalls,
    /// A diagonal path cell would touch it only at a corner
    OpenCorner,
    /// Terrain is too high
    Impassable,
}

/// Outcome of a single carver step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarveStep {
    /// Cell became a path and its neighbors were queued
    Carved(GridPoint),
    /// Cell was discarded
    Rejected(GridPoint, Rejection),
    /// Stack ran dry below target; a new seed was queued
    Reseeded(GridPoint),
    /// Target met or retries exhausted
    Finished,
}

/// Summary of a finished (or in-progress) carve.
#[derive(Debug, Clone, PartialEq)]
pub struct CarveReport {
    /// Number of path cells
    pub path_tiles: usize,
    /// Cells in the grid
    pub total_cells: usize,
    /// `path_tiles / total_cells`
    pub coverage: f32,
    /// Requested minimum coverage
    pub target: f32,
    /// Re-seeds consumed
    pub retries_used: u32,
    /// Start cell followed by every re-seed, in order
    pub seeds: Vec<GridPoint>,
}

impl CarveReport {
    /// Whether the coverage target was reached.
    #[must_use]
    pub fn target_met(&self) -> bool {
        self.coverage >= self.target
    }
}

/// Step-wise carving state machine.
#[derive(Debug)]
pub struct PathCarver {
    settings: CarveSettings,
    resolution: CarveResolution,
    grid: MazeGrid,
    stack: Vec<GridPoint>,
    rng: fastrand::Rng,
    path_tiles: usize,
    retries_left: u32,
    seeds: Vec<GridPoint>,
    finished: bool,
}

impl PathCarver {
    /// Creates a carver with an all-wall grid and `(1, 1)` queued.
    pub fn new(settings: CarveSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let resolution = CarveResolution::new(settings.scale)?;
        Ok(Self {
            grid: MazeGrid::walls(settings.rows, settings.cols),
            stack: vec![START_CELL],
            rng: fastrand::Rng::with_seed(settings.seed),
            path_tiles: 0,
            retries_left: settings.retry_budget,
            seeds: vec![START_CELL],
            finished: false,
            resolution,
            settings,
        })
    }

    /// Current grid.
    #[must_use]
    pub fn grid(&self) -> &MazeGrid {
        &self.grid
    }

    /// Path cells carved so far.
    #[must_use]
    pub const fn path_tiles(&self) -> usize {
        self.path_tiles
    }

    /// Fraction of cells carved so far.
    #[must_use]
    pub fn coverage(&self) -> f32 {
        self.path_tiles as f32 / self.grid.total_cells() as f32
    }

    /// Whether the carve has terminated.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Checks whether `cell` may become a path right now.
    pub fn can_carve(&self, cell: GridPoint, gate: Option<&HeightGate<'_>>) -> Result<(), Rejection> {
        if self.grid.get(cell) != MazeTile::Wall {
            return Err(Rejection::AlreadyPath);
        }

        let walls = cell
            .orthogonal()
            .iter()
            .filter(|&&n| self.grid.get(n) == MazeTile::Wall)
            .count();
        if walls < 3 {
            return Err(Rejection::TooFewWalls);
        }

        for corner in cell.diagonal() {
            if !self.grid.is_path(corner) {
                continue;
            }
            let shared_row = GridPoint::new(corner.row, cell.col);
            let shared_col = GridPoint::new(cell.row, corner.col);
            if !self.grid.is_path(shared_row) && !self.grid.is_path(shared_col) {
                return Err(Rejection::OpenCorner);
            }
        }

        if gate.is_some_and(|g| g.blocks(self.resolution.to_fine(cell))) {
            return Err(Rejection::Impassable);
        }

        Ok(())
    }

    /// Advances the carve by one candidate (or one re-seed).
    pub fn step(&mut self, gate: Option<&HeightGate<'_>>) -> CarveStep {
        if self.finished {
            return CarveStep::Finished;
        }

        if let Some(cell) = self.stack.pop() {
            if let Err(reason) = self.can_carve(cell, gate) {
                return CarveStep::Rejected(cell, reason);
            }
            self.grid.set(cell, MazeTile::Path);
            self.path_tiles += 1;

            let mut neighbors = cell.orthogonal();
            self.rng.shuffle(&mut neighbors);
            self.stack
                .extend(neighbors.into_iter().filter(|&n| self.grid.contains(n)));
            return CarveStep::Carved(cell);
        }

        if self.coverage() < self.settings.min_coverage && self.retries_left > 0 {
            let seed = GridPoint::new(
                self.rng.usize(1..self.grid.rows() - 1) as i64,
                self.rng.usize(1..self.grid.cols() - 1) as i64,
            );
            self.retries_left -= 1;
            self.seeds.push(seed);
            self.stack.push(seed);
            debug!(
                "Re-seeding carve at ({}, {}) with coverage {:.3}, {} retries left",
                seed.row,
                seed.col,
                self.coverage(),
                self.retries_left
            );
            return CarveStep::Reseeded(seed);
        }

        self.finished = true;
        let report = self.report();
        if report.target_met() {
            info!(
                "Carved {} of {} cells ({:.1}%) using {} retries",
                report.path_tiles,
                report.total_cells,
                report.coverage * 100.0,
                report.retries_used
            );
        } else {
            warn!(
                "Carve stopped at {:.1}% coverage, below target {:.1}% after {} retries",
                report.coverage * 100.0,
                report.target * 100.0,
                report.retries_used
            );
        }
        CarveStep::Finished
    }

    /// Steps until the carve terminates.
    pub fn run(&mut self, gate: Option<&HeightGate<'_>>) -> CarveReport {
        while self.step(gate) != CarveStep::Finished {}
        self.report()
    }

    /// Current progress summary.
    #[must_use]
    pub fn report(&self) -> CarveReport {
        CarveReport {
            path_tiles: self.path_tiles,
            total_cells: self.grid.total_cells(),
            coverage: self.coverage(),
            target: self.settings.min_coverage,
            retries_used: self.settings.retry_budget - self.retries_left,
            seeds: self.seeds.clone(),
        }
    }

    /// Freezes the grid into a read-only [`PathMap`].
    #[must_use]
    pub fn finish(self) -> PathMap {
        let report = self.report();
        PathMap {
            grid: self.grid,
            resolution: self.resolution,
            report,
        }
    }
}

/// Runs a complete carve and freezes the result.
pub fn carve(settings: CarveSettings, gate: Option<&HeightGate<'_>>) -> Result<PathMap, ConfigError> {
    let mut carver = PathCarver::new(settings)?;
    carver.run(gate);
    Ok(carver.finish())
}

/// Read-only path lookup in fine coordinates.
pub trait PathQuery: Send + Sync {
    /// Path state at a fine coordinate; [`MazeTile::Invalid`] outside.
    fn tile_at(&self, fine: GridPoint) -> MazeTile;
}

impl PathQuery for PathMap {
    fn tile_at(&self, fine: GridPoint) -> MazeTile {
        PathMap::tile_at(self, fine)
    }
}

/// Immutable carved maze, queried in fine coordinates.
///
/// Shared read-only by every tile that paints a path overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMap {
    grid: MazeGrid,
    resolution: CarveResolution,
    report: CarveReport,
}

impl PathMap {
    /// State of the carving cell containing a fine coordinate.
    ///
    /// Never fails: anything outside the grid is [`MazeTile::Invalid`].
    #[must_use]
    pub fn tile_at(&self, fine: GridPoint) -> MazeTile {
        self.grid.get(self.resolution.to_carve(fine))
    }

    /// Whether a fine coordinate is walkable.
    #[must_use]
    pub fn is_walkable(&self, fine: GridPoint) -> bool {
        self.tile_at(fine) == MazeTile::Path
    }

    /// The carving-resolution grid.
    #[must_use]
    pub fn grid(&self) -> &MazeGrid {
        &self.grid
    }

    /// Fine/carve coordinate mapping.
    #[must_use]
    pub const fn resolution(&self) -> CarveResolution {
        self.resolution
    }

    /// Final carve summary.
    #[must_use]
    pub fn report(&self) -> &CarveReport {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> CarveSettings {
        CarveSettings {
            seed,
            ..CarveSettings::default()
        }
    }

    #[test]
    fn test_start_cell_is_carved_first() {
        let mut carver = PathCarver::new(settings(1)).expect("valid settings");
        assert_eq!(carver.step(None), CarveStep::Carved(START_CELL));
        assert!(carver.grid().is_path(START_CELL));
        assert_eq!(carver.path_tiles(), 1);
    }

    #[test]
    fn test_carve_is_deterministic_per_seed() {
        let a = carve(settings(42), None).expect("valid settings");
        let b = carve(settings(42), None).expect("valid settings");
        assert_eq!(a.grid(), b.grid());
    }

    #[test]
    fn test_report_matches_grid() {
        for seed in 0..16 {
            let map = carve(settings(seed), None).expect("valid settings");
            let report = map.report();
            assert_eq!(report.path_tiles, map.grid().path_count());
            assert_eq!(report.total_cells, 121);
            let expected = report.path_tiles as f32 / 121.0;
            assert!((report.coverage - expected).abs() < f32::EPSILON);
            assert!(report.target_met() || report.retries_used == 20);
            assert_eq!(report.seeds.len() as u32, report.retries_used + 1);
        }
    }

    #[test]
    fn test_no_retries_without_budget() {
        let map = carve(
            CarveSettings {
                min_coverage: 1.0,
                retry_budget: 0,
                ..settings(5)
            },
            None,
        )
        .expect("valid settings");
        assert_eq!(map.report().retries_used, 0);
        assert!(!map.report().target_met());
    }

    #[test]
    fn test_rejects_cell_beside_two_paths() {
        let mut carver = PathCarver::new(settings(0)).expect("valid settings");
        carver.grid.set(GridPoint::new(2, 1), MazeTile::Path);
        carver.grid.set(GridPoint::new(2, 3), MazeTile::Path);
        assert_eq!(
            carver.can_carve(GridPoint::new(2, 2), None),
            Err(Rejection::TooFewWalls)
        );
    }

    #[test]
    fn test_rejects_open_corner() {
        let mut carver = PathCarver::new(settings(0)).expect("valid settings");
        carver.grid.set(GridPoint::new(3, 3), MazeTile::Path);
        assert_eq!(
            carver.can_carve(GridPoint::new(2, 2), None),
            Err(Rejection::OpenCorner)
        );
        // the same diagonal is fine once a shared orthogonal cell is a path
        carver.grid.set(GridPoint::new(3, 2), MazeTile::Path);
        assert_eq!(carver.can_carve(GridPoint::new(2, 2), None), Ok(()));
    }

    #[test]
    fn test_rejects_existing_path() {
        let mut carver = PathCarver::new(settings(0)).expect("valid settings");
        carver.step(None);
        assert_eq!(
            carver.can_carve(START_CELL, None),
            Err(Rejection::AlreadyPath)
        );
    }

    #[test]
    fn test_height_gate_blocks_high_cells() {
        let heights = HeightGrid::from_values(11, 11, vec![1.0; 121]).expect("matching length");
        let gate = HeightGate::new(&heights, 0.85);
        let map = carve(settings(3), Some(&gate)).expect("valid settings");
        assert_eq!(map.grid().path_count(), 0);

        let low = HeightGrid::from_values(11, 11, vec![0.2; 121]).expect("matching length");
        let gate = HeightGate::new(&low, 0.85);
        let map = carve(settings(3), Some(&gate)).expect("valid settings");
        assert!(map.grid().path_count() > 0);
    }

    #[test]
    fn test_height_gate_respects_carve_scale() {
        // fine rows 12.. are high ground; at scale 2 that is carve rows 6..
        let values = (0..24 * 24)
            .map(|i| if i / 24 >= 12 { 0.9 } else { 0.1 })
            .collect();
        let heights = HeightGrid::from_values(24, 24, values).expect("matching length");
        let gate = HeightGate::new(&heights, 0.5);
        for seed in 0..20 {
            let coarse = CarveSettings {
                rows: 12,
                cols: 12,
                scale: 2,
                ..settings(seed)
            };
            let map = carve(coarse, Some(&gate)).expect("valid settings");
            assert!(map.grid().path_count() > 0);
            for cell in map.grid().paths() {
                assert!(cell.row < 6, "seed {seed}: path at {cell:?} on high ground");
                assert!(map.resolution().to_fine(cell).row < 12);
            }
        }
    }

    #[test]
    fn test_tile_at_scales_and_bounds() {
        let map = carve(
            CarveSettings {
                rows: 5,
                cols: 5,
                scale: 3,
                ..settings(9)
            },
            None,
        )
        .expect("valid settings");
        for fine_row in 3..6 {
            for fine_col in 3..6 {
                assert_eq!(map.tile_at(GridPoint::new(fine_row, fine_col)), MazeTile::Path);
            }
        }
        assert_eq!(map.tile_at(GridPoint::new(-1, 0)), MazeTile::Invalid);
        assert_eq!(map.tile_at(GridPoint::new(0, 15)), MazeTile::Invalid);
        assert_eq!(map.tile_at(GridPoint::new(14, 14)), map.grid().get(GridPoint::new(4, 4)));
    }

    #[test]
    fn test_resolution_round_trip() {
        let res = CarveResolution::new(4).expect("positive scale");
        for row in -3..6 {
            for col in -3..6 {
                let cell = GridPoint::new(row, col);
                assert_eq!(res.to_carve(res.to_fine(cell)), cell);
            }
        }
        assert_eq!(res.to_fine(GridPoint::new(1, 2)), GridPoint::new(6, 10));
        assert_eq!(res.cells_for(9), 3);
    }

    #[test]
    fn test_settings_validation() {
        let too_small = CarveSettings {
            rows: 2,
            ..CarveSettings::default()
        };
        assert!(matches!(
            PathCarver::new(too_small),
            Err(ConfigError::GridTooSmall { rows: 2, cols: 11 })
        ));
        let bad_cover = CarveSettings {
            min_coverage: 1.5,
            ..CarveSettings::default()
        };
        assert_eq!(bad_cover.validate(), Err(ConfigError::InvalidCoverage(1.5)));
        let zero_scale = CarveSettings {
            scale: 0,
            ..CarveSettings::default()
        };
        assert_eq!(zero_scale.validate(), Err(ConfigError::ZeroCarveScale));
    }

    #[test]
    fn test_display_dump() {
        let map = carve(settings(11), None).expect("valid settings");
        let text = map.grid().to_string();
        assert_eq!(text.lines().count(), 11);
        assert!(text.lines().all(|line| line.len() == 11));
        assert_eq!(text.chars().filter(|&c| c == 'O').count(), map.grid().path_count());
        assert_eq!(text.lines().nth(1).and_then(|l| l.chars().nth(1)), Some('O'));
    }
}
