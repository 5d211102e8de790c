//! # Pathland
//!
//! Headless driver for the Pathland generator.
//!
//! Loads `pathland.toml` (or the path given as the first argument,
//! writing defaults there on first run), generates a bounded pathed level
//! and prints its maze, then walks an observer around a loop while a tile
//! stream follows it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;

use std::path::PathBuf;

use anyhow::{bail, Result};
use glam::Vec3;
use pathland_common::{TileCoord, TileExtent};
use pathland_world::{PathedLevel, StreamStats, Tile, TileFactory, TileStream};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::PathlandConfig;

/// Observer speed in world units per tick.
const WALK_STEP: f32 = 1.5;

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("pathland=info".parse()?))
        .init();

    info!("Pathland starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .map_or_else(PathlandConfig::config_path, PathBuf::from);
    let mut config = PathlandConfig::load_from(&config_path);
    if !config_path.exists() {
        config.save_to(&config_path)?;
    }
    config.validate();

    let mut rng = fastrand::Rng::new();
    let builder = config.tile_builder(&mut rng)?;

    let level = PathedLevel::generate(&builder, &config.level_settings())?;
    let report = level.report();
    info!(
        "Level carve: {} path cells, {:.1}% coverage (target {:.1}%), {} retries",
        report.path_tiles,
        report.coverage * 100.0,
        report.target * 100.0,
        report.retries_used
    );
    println!("{}", level.path_map().grid());

    let overlay = level.overlay().clone();
    let stream_config = config.stream_config(TileCoord::ORIGIN);
    let mut stream = TileStream::with_on_ready(builder, stream_config, move |_, tile: &mut Tile| {
        overlay.paint(tile);
    })?;
    let stats = follow(&mut stream, &walk_loop(config.tile_extent()))?;
    info!(
        "Streaming done: {} shifts, {} tiles constructed, {} destroyed, {} discarded",
        stats.shifts, stats.constructed, stats.destroyed, stats.discarded
    );

    info!("Pathland shutdown complete");
    Ok(())
}

/// Moves the observer along `route` and returns the stream's counters once
/// the final window is ready.
fn follow<F: TileFactory>(stream: &mut TileStream<F>, route: &[Vec3]) -> Result<StreamStats> {
    if !stream.wait_ready() {
        bail!("Initial tile window around {} never became ready", stream.center());
    }

    for position in route {
        if let Some(direction) = stream.step(*position) {
            info!(
                "Observer at ({:.1}, {:.1}) crossed {direction:?}, window centered on {}",
                position.x,
                position.z,
                stream.center()
            );
        }
    }

    if !stream.wait_ready() {
        bail!("Tile window around {} never became ready", stream.center());
    }
    Ok(stream.stats())
}

/// Positions along a rectangular loop: three tiles east, two north, back
/// west past the origin, then south to the start row.
fn walk_loop(extent: TileExtent) -> Vec<Vec3> {
    let legs = [
        (Vec3::X, 3.0 * extent.width),
        (Vec3::Z, 2.0 * extent.depth),
        (Vec3::NEG_X, 4.0 * extent.width),
        (Vec3::NEG_Z, 2.0 * extent.depth),
    ];

    let mut position = Vec3::ZERO;
    let mut points = vec![position];
    for (heading, distance) in legs {
        let ticks = (distance / WALK_STEP).ceil() as usize;
        for _ in 0..ticks {
            position += heading * WALK_STEP;
            points.push(position);
        }
    }
    points
}
