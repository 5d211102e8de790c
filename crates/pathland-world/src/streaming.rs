//! Tile streaming around a moving observer.
//!
//! The stream keeps a square window of `(2R + 1)^2` tiles centered on the
//! observer's tile. When the observer leaves the center tile through one
//! edge, the window shifts one tile in that direction:
//! - the trailing line of tiles is destroyed
//! - the remaining lines move one slot toward the trailing edge
//! - the newly exposed leading line is reserved and constructed
//!
//! Slot bookkeeping is always synchronous. Tile content is built either
//! inline or on a worker pool; until it arrives the slot is
//! [`TileState::Reserved`]. Results for slots that were vacated in the
//! meantime are handed back to the factory for release. A worker whose
//! build panics reports the slot as [`TileState::Failed`] and keeps
//! serving jobs.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use pathland_common::{ConfigError, PathlandResult, TileCoord, TileExtent};
use tracing::{debug, info, warn};

use crate::tile::{Tile, TileBuilder};

/// Default render distance in tiles.
pub const DEFAULT_RENDER_DISTANCE: u32 = 2;

/// Largest supported render distance.
pub const MAX_RENDER_DISTANCE: u32 = 10;

/// Produces and releases tiles for the stream.
///
/// `build` must be deterministic per coordinate.
pub trait TileFactory: Send + Sync + 'static {
    /// Materialized tile handle
    type Tile: Send + 'static;

    /// Constructs the tile at `coord`.
    fn build(&self, coord: TileCoord) -> Self::Tile;

    /// Releases a tile leaving the window.
    fn release(&self, tile: Self::Tile) {
        drop(tile);
    }
}

impl TileFactory for TileBuilder {
    type Tile = Tile;

    fn build(&self, coord: TileCoord) -> Tile {
        TileBuilder::build(self, coord)
    }
}

/// Axis of a window shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Rows (world Z)
    Row,
    /// Columns (world X)
    Col,
}

/// Direction the observer crossed out of the center tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +Z
    North,
    /// -Z
    South,
    /// +X
    East,
    /// -X
    West,
}

impl Direction {
    /// All four directions.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Axis the shift moves along.
    #[must_use]
    pub const fn axis(self) -> Axis {
        match self {
            Self::North | Self::South => Axis::Row,
            Self::East | Self::West => Axis::Col,
        }
    }

    /// `+1` toward increasing coordinates, `-1` otherwise.
    #[must_use]
    pub const fn sign(self) -> i32 {
        match self {
            Self::North | Self::East => 1,
            Self::South | Self::West => -1,
        }
    }

    /// `(rows, cols)` tile delta.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self.axis() {
            Axis::Row => (self.sign(), 0),
            Axis::Col => (0, self.sign()),
        }
    }
}

/// Content state of a window slot.
#[derive(Debug)]
pub enum TileState<T> {
    /// Slot claimed, content pending
    Reserved,
    /// Content available
    Ready(T),
    /// Construction panicked; the slot stays empty until it leaves the window
    Failed,
}

/// One window slot.
#[derive(Debug)]
pub struct TileSlot<T> {
    coord: TileCoord,
    ticket: u64,
    state: TileState<T>,
}

impl<T> TileSlot<T> {
    /// World tile coordinate this slot holds.
    #[must_use]
    pub const fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Whether content has arrived.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, TileState::Ready(_))
    }

    /// Tile content, once ready.
    #[must_use]
    pub const fn tile(&self) -> Option<&T> {
        match &self.state {
            TileState::Ready(tile) => Some(tile),
            TileState::Reserved | TileState::Failed => None,
        }
    }

    /// Content state.
    #[must_use]
    pub const fn state(&self) -> &TileState<T> {
        &self.state
    }
}

/// Streaming counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Tiles that reached `Ready`
    pub constructed: u64,
    /// Ready tiles released on leaving the window
    pub destroyed: u64,
    /// Reserved slots vacated before their content arrived
    pub discarded: u64,
    /// Window shifts performed
    pub shifts: u64,
    /// Constructions that panicked on a worker
    pub failed: u64,
}

/// Where tile content is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConstructionMode {
    /// On the caller's thread during `step`/`poll`
    #[default]
    Inline,
    /// On a pool of background workers
    Deferred {
        /// Worker thread count
        workers: usize,
    },
}

/// Stream window configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    /// Render distance R; the window is `2R + 1` tiles per side
    pub radius: u32,
    /// World-space tile footprint
    pub extent: TileExtent,
    /// Initial center tile
    pub center: TileCoord,
    /// Construction mode
    pub mode: ConstructionMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RENDER_DISTANCE,
            extent: TileExtent::new(10.0, 10.0),
            center: TileCoord::ORIGIN,
            mode: ConstructionMode::Inline,
        }
    }
}

impl StreamConfig {
    /// Checks the window can be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let TileExtent { width, depth } = self.extent;
        if !(width > 0.0 && depth > 0.0) {
            return Err(ConfigError::TileExtent { width, depth });
        }
        if self.mode == (ConstructionMode::Deferred { workers: 0 }) {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

struct Job {
    coord: TileCoord,
    ticket: u64,
}

/// Worker result. `tile` is `None` when the build panicked.
struct Built<T> {
    coord: TileCoord,
    ticket: u64,
    tile: Option<T>,
}

/// Background construction workers fed over channels.
struct WorkerPool<T> {
    jobs: Option<Sender<Job>>,
    results: Receiver<Built<T>>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    fn spawn<F>(factory: &Arc<F>, count: usize) -> PathlandResult<Self>
    where
        F: TileFactory<Tile = T>,
    {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Built<T>>();

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let factory = Arc::clone(factory);
            let handle = std::thread::Builder::new()
                .name(format!("tile-worker-{index}"))
                .spawn(move || {
                    for job in jobs {
                        let tile =
                            panic::catch_unwind(AssertUnwindSafe(|| factory.build(job.coord)))
                                .ok();
                        let built = Built {
                            coord: job.coord,
                            ticket: job.ticket,
                            tile,
                        };
                        if done.send(built).is_err() {
                            break;
                        }
                    }
                })?;
            workers.push(handle);
        }

        info!("Started {count} tile workers");
        Ok(Self {
            jobs: Some(job_tx),
            results: done_rx,
            workers,
            in_flight: 0,
        })
    }

    fn submit(&mut self, coord: TileCoord, ticket: u64) {
        if let Some(jobs) = &self.jobs {
            if jobs.send(Job { coord, ticket }).is_err() {
                warn!("Tile workers are gone; {coord} will stay reserved");
                return;
            }
            self.in_flight += 1;
        }
    }

    fn try_next(&mut self) -> Option<Built<T>> {
        let built = self.results.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(built)
    }

    fn wait_next(&mut self) -> Option<Built<T>> {
        let built = self.results.recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(built)
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        // Closing the job channel ends each worker's receive loop.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Tile worker panicked");
            }
        }
    }
}

enum Construction<T> {
    Inline(VecDeque<(TileCoord, u64)>),
    Pool(WorkerPool<T>),
}

type ReadyHook<T> = Box<dyn FnMut(TileCoord, &mut T)>;

/// Fixed-size window of tiles that follows an observer.
pub struct TileStream<F: TileFactory> {
    radius: usize,
    side: usize,
    extent: TileExtent,
    center: TileCoord,
    slots: Vec<Option<TileSlot<F::Tile>>>,
    factory: Arc<F>,
    construction: Construction<F::Tile>,
    on_ready: Option<ReadyHook<F::Tile>>,
    next_ticket: u64,
    stats: StreamStats,
}

impl<F: TileFactory> fmt::Debug for TileStream<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileStream")
            .field("radius", &self.radius)
            .field("center", &self.center)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<F: TileFactory> TileStream<F> {
    /// Creates a stream and requests every tile of the initial window.
    pub fn new(factory: F, config: StreamConfig) -> PathlandResult<Self> {
        Self::create(factory, config, None)
    }

    /// Creates a stream whose tiles pass through `on_ready` exactly once,
    /// when their content arrives.
    pub fn with_on_ready<H>(factory: F, config: StreamConfig, on_ready: H) -> PathlandResult<Self>
    where
        H: FnMut(TileCoord, &mut F::Tile) + 'static,
    {
        Self::create(factory, config, Some(Box::new(on_ready)))
    }

    fn create(
        factory: F,
        config: StreamConfig,
        on_ready: Option<ReadyHook<F::Tile>>,
    ) -> PathlandResult<Self> {
        config.validate()?;
        let factory = Arc::new(factory);
        let construction = match config.mode {
            ConstructionMode::Inline => Construction::Inline(VecDeque::new()),
            ConstructionMode::Deferred { workers } => {
                Construction::Pool(WorkerPool::spawn(&factory, workers)?)
            },
        };

        let radius = config.radius.min(MAX_RENDER_DISTANCE) as usize;
        let side = radius * 2 + 1;
        let mut stream = Self {
            radius,
            side,
            extent: config.extent,
            center: config.center,
            slots: (0..side * side).map(|_| None).collect(),
            factory,
            construction,
            on_ready,
            next_ticket: 0,
            stats: StreamStats::default(),
        };

        for index in 0..side * side {
            stream.reserve(index);
        }
        stream.poll();
        Ok(stream)
    }

    /// Render distance R.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Window side length, `2R + 1`.
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Tile coordinate at the window center.
    #[must_use]
    pub const fn center(&self) -> TileCoord {
        self.center
    }

    /// Streaming counters.
    #[must_use]
    pub const fn stats(&self) -> StreamStats {
        self.stats
    }

    /// The tile factory.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Slot at window position `(row, col)`.
    #[must_use]
    pub fn slot(&self, row: usize, col: usize) -> Option<&TileSlot<F::Tile>> {
        if row >= self.side || col >= self.side {
            return None;
        }
        self.slots[row * self.side + col].as_ref()
    }

    /// All occupied slots, row-major.
    pub fn slots(&self) -> impl Iterator<Item = &TileSlot<F::Tile>> + '_ {
        self.slots.iter().flatten()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots().count()
    }

    /// Whether every slot has content.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slots.iter().all(|s| s.as_ref().is_some_and(TileSlot::is_ready))
    }

    /// Ready tile at a world tile coordinate, if it is inside the window.
    #[must_use]
    pub fn tile(&self, coord: TileCoord) -> Option<&F::Tile> {
        let index = self.index_of(coord)?;
        self.slots[index].as_ref().and_then(TileSlot::tile)
    }

    /// Compares the observer against the center tile and shifts the window
    /// by at most one tile. Returns the shift performed, if any.
    ///
    /// An observer more than one tile away needs several steps to catch up.
    pub fn step(&mut self, observer: Vec3) -> Option<Direction> {
        let (min, max) = self.extent.bounds(self.center);
        let direction = if observer.z > max.z {
            Some(Direction::North)
        } else if observer.z < min.z {
            Some(Direction::South)
        } else if observer.x > max.x {
            Some(Direction::East)
        } else if observer.x < min.x {
            Some(Direction::West)
        } else {
            None
        };

        if let Some(direction) = direction {
            self.shift(direction);
        }
        self.poll();
        direction
    }

    /// Steps until the window is centered on the observer's tile or
    /// `max_steps` shifts were made. Returns the number of shifts.
    pub fn catch_up(&mut self, observer: Vec3, max_steps: usize) -> usize {
        let mut shifts = 0;
        while shifts < max_steps && self.step(observer).is_some() {
            shifts += 1;
        }
        shifts
    }

    /// Moves the window one tile in `direction`.
    pub fn shift(&mut self, direction: Direction) {
        let n = self.side;
        let axis = direction.axis();
        let (trailing, leading) = if direction.sign() > 0 { (0, n - 1) } else { (n - 1, 0) };

        for k in 0..n {
            let index = self.line_index(axis, trailing, k);
            if let Some(slot) = self.slots[index].take() {
                self.vacate(slot);
            }
        }

        match (axis, direction.sign() > 0) {
            (Axis::Row, true) => self.slots.rotate_left(n),
            (Axis::Row, false) => self.slots.rotate_right(n),
            (Axis::Col, true) => self.slots.chunks_mut(n).for_each(|row| row.rotate_left(1)),
            (Axis::Col, false) => self.slots.chunks_mut(n).for_each(|row| row.rotate_right(1)),
        }

        let (rows, cols) = direction.delta();
        self.center = self.center.offset(rows, cols);
        for k in 0..n {
            let index = self.line_index(axis, leading, k);
            self.reserve(index);
        }

        self.stats.shifts += 1;
        debug!("Shifted tile window {direction:?}, center now {}", self.center);
    }

    /// Installs finished tiles without blocking. Returns how many arrived.
    pub fn poll(&mut self) -> usize {
        let mut arrived = 0;
        for (coord, ticket) in self.take_pending() {
            if self.reserved_index(coord, ticket).is_some() {
                let tile = self.factory.build(coord);
                arrived += usize::from(self.install(Built {
                    coord,
                    ticket,
                    tile: Some(tile),
                }));
            }
        }
        while let Some(built) = self.try_next_result() {
            arrived += usize::from(self.install(built));
        }
        arrived
    }

    /// Blocks until no slot is waiting on content. Returns `false` if some
    /// slot failed to build or construction stopped before that could
    /// happen.
    pub fn wait_ready(&mut self) -> bool {
        self.poll();
        while self.has_reserved() {
            let Some(built) = self.next_result() else {
                warn!("Tile construction channel closed with slots still reserved");
                return false;
            };
            self.install(built);
        }
        if !self.is_ready() {
            warn!("Tile window centered on {} has failed slots", self.center);
            return false;
        }
        true
    }

    /// Blocks until every submitted construction has reported back,
    /// including results for slots that already left the window.
    pub fn wait_idle(&mut self) -> bool {
        self.poll();
        while self.in_flight() > 0 {
            let Some(built) = self.next_result() else {
                let pending = self.in_flight();
                warn!("Tile construction channel closed with {pending} jobs in flight");
                return false;
            };
            self.install(built);
        }
        true
    }

    fn has_reserved(&self) -> bool {
        self.slots().any(|slot| matches!(slot.state, TileState::Reserved))
    }

    fn in_flight(&self) -> usize {
        match &self.construction {
            Construction::Inline(_) => 0,
            Construction::Pool(pool) => pool.in_flight,
        }
    }

    fn take_pending(&mut self) -> Vec<(TileCoord, u64)> {
        match &mut self.construction {
            Construction::Inline(pending) => pending.drain(..).collect(),
            Construction::Pool(_) => Vec::new(),
        }
    }

    fn try_next_result(&mut self) -> Option<Built<F::Tile>> {
        match &mut self.construction {
            Construction::Inline(_) => None,
            Construction::Pool(pool) => pool.try_next(),
        }
    }

    fn next_result(&mut self) -> Option<Built<F::Tile>> {
        match &mut self.construction {
            Construction::Inline(_) => None,
            Construction::Pool(pool) => pool.wait_next(),
        }
    }

    fn reserve(&mut self, index: usize) {
        let coord = self.coord_of(index);
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.slots[index] = Some(TileSlot {
            coord,
            ticket,
            state: TileState::Reserved,
        });
        match &mut self.construction {
            Construction::Inline(pending) => pending.push_back((coord, ticket)),
            Construction::Pool(pool) => pool.submit(coord, ticket),
        }
    }

    fn install(&mut self, built: Built<F::Tile>) -> bool {
        let Built { coord, ticket, tile } = built;
        let Some(index) = self.reserved_index(coord, ticket) else {
            // the slot moved on while this tile was being built
            if let Some(tile) = tile {
                self.factory.release(tile);
            }
            return false;
        };
        let Some(mut tile) = tile else {
            warn!("Construction of tile {coord} panicked");
            if let Some(slot) = self.slots[index].as_mut() {
                slot.state = TileState::Failed;
            }
            self.stats.failed += 1;
            return false;
        };
        if let Some(hook) = self.on_ready.as_mut() {
            hook(coord, &mut tile);
        }
        if let Some(slot) = self.slots[index].as_mut() {
            slot.state = TileState::Ready(tile);
        }
        self.stats.constructed += 1;
        true
    }

    fn vacate(&mut self, slot: TileSlot<F::Tile>) {
        match slot.state {
            TileState::Ready(tile) => {
                self.factory.release(tile);
                self.stats.destroyed += 1;
            },
            TileState::Reserved => self.stats.discarded += 1,
            TileState::Failed => {},
        }
    }

    fn reserved_index(&self, coord: TileCoord, ticket: u64) -> Option<usize> {
        let index = self.index_of(coord)?;
        let slot = self.slots[index].as_ref()?;
        (slot.ticket == ticket && matches!(slot.state, TileState::Reserved)).then_some(index)
    }

    fn index_of(&self, coord: TileCoord) -> Option<usize> {
        let r = self.radius as i64;
        let row = i64::from(coord.row) - i64::from(self.center.row) + r;
        let col = i64::from(coord.col) - i64::from(self.center.col) + r;
        let n = self.side as i64;
        ((0..n).contains(&row) && (0..n).contains(&col)).then(|| (row * n + col) as usize)
    }

    fn coord_of(&self, index: usize) -> TileCoord {
        let r = self.radius as i32;
        let row = (index / self.side) as i32;
        let col = (index % self.side) as i32;
        self.center.offset(row - r, col - r)
    }

    const fn line_index(&self, axis: Axis, line: usize, k: usize) -> usize {
        match axis {
            Axis::Row => line * self.side + k,
            Axis::Col => k * self.side + line,
        }
    }
}
