//! Pathfinding benchmark on a seeded obstacle map.
//!
//! Builds a procedurally obstructed map, queues a mix of long and short
//! path requests between random passable points and pushes them through the
//! orchestrator turn by turn, the way the simulation would.

use std::time::Instant;

use nav_core::components::INVALID_ENTITY;
use nav_core::goal::PathGoal;
use nav_core::math::{Fixed, Vec2Fixed};
use nav_core::path::{PathKind, ShortPathRequest};
use nav_test_utils::fixtures::{obstacle_course, random_passable_point, ScenarioParams, ScenarioRng};
use serde::Serialize;
use tracing::{debug, warn};

/// Passability class used for every request.
const BENCH_CLASS: &str = "default";

/// Half-size of the short path search box.
const SHORT_RANGE: i32 = 32;

/// Benchmark inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchParams {
    /// Map side in terrain tiles.
    pub tiles: u16,
    /// Number of path requests.
    pub requests: u32,
    /// RNG seed for obstacles and endpoints.
    pub seed: u64,
    /// Path worker count (0 = one per core).
    pub workers: usize,
}

/// Benchmark summary, printed as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchReport {
    /// Map side in terrain tiles.
    pub tiles: u16,
    /// Map side in navcells.
    pub navcells: u16,
    /// RNG seed.
    pub seed: u64,
    /// Path worker count requested.
    pub workers: usize,
    /// Obstacles placed.
    pub obstacles: u32,
    /// Global regions of the benchmark class after obstacles were placed.
    pub global_regions: usize,
    /// Requests issued.
    pub requests: u32,
    /// Long-range results received.
    pub long_paths: u32,
    /// Short-range results received.
    pub short_paths: u32,
    /// Results with no waypoints.
    pub empty_paths: u32,
    /// Waypoints over all results.
    pub total_waypoints: usize,
    /// Turns needed to drain the queue.
    pub turns: u32,
    /// Wall-clock time spent in those turns.
    pub elapsed_ms: u128,
}

/// One obstacle per 64 tiles of map area.
fn obstacle_count(tiles: u16) -> u32 {
    (u32::from(tiles) * u32::from(tiles) / 64).max(1)
}

/// Run the benchmark.
#[must_use]
pub fn run_bench(params: &BenchParams) -> BenchReport {
    let obstacles = obstacle_count(params.tiles);
    let mut sim = obstacle_course(&ScenarioParams {
        tiles: params.tiles,
        obstacles,
        units: 0,
        seed: params.seed,
        workers: params.workers,
    });
    let mask = sim.pathfinder().pass_class(BENCH_CLASS);
    let clearance = sim.pathfinder().clearance(mask);
    let global_regions = sim.pathfinder().hierarchical().global_region_count(mask);

    let mut rng = ScenarioRng::new(params.seed.rotate_left(17));
    let mut issued = 0u32;
    for k in 0..params.requests {
        let (Some(start), Some(end)) = (
            random_passable_point(&sim, &mut rng, BENCH_CLASS),
            random_passable_point(&sim, &mut rng, BENCH_CLASS),
        ) else {
            warn!("No passable points for class {BENCH_CLASS}");
            break;
        };
        let pathfinder = sim.pathfinder_mut();
        if k % 2 == 0 {
            pathfinder.compute_path_async(start, PathGoal::point(end), mask, INVALID_ENTITY);
        } else {
            // Short requests stay inside their search box.
            let dx = (end.x - start.x).clamp(Fixed::from_num(-SHORT_RANGE), Fixed::from_num(SHORT_RANGE));
            let dy = (end.y - start.y).clamp(Fixed::from_num(-SHORT_RANGE), Fixed::from_num(SHORT_RANGE));
            let goal = start + Vec2Fixed::new(dx, dy) * (Fixed::ONE / 2);
            pathfinder.compute_short_path_async(ShortPathRequest {
                ticket: 0,
                start,
                clearance,
                range: Fixed::from_num(SHORT_RANGE),
                goal: PathGoal::point(goal),
                pass_class: mask,
                avoid_moving_units: false,
                group: INVALID_ENTITY,
                notify: INVALID_ENTITY,
            });
        }
        issued += 1;
    }

    let per_turn = sim.pathfinder().config().max_same_turn_moves.max(1);
    let max_turns = (issued as usize).div_ceil(per_turn) as u32 + 2;
    let mut report = BenchReport {
        tiles: params.tiles,
        navcells: sim.obstructions().width(),
        seed: params.seed,
        workers: params.workers,
        obstacles,
        global_regions,
        requests: issued,
        long_paths: 0,
        short_paths: 0,
        empty_paths: 0,
        total_waypoints: 0,
        turns: 0,
        elapsed_ms: 0,
    };

    let started = Instant::now();
    while report.long_paths + report.short_paths < issued && report.turns < max_turns {
        for result in sim.tick().path_results {
            match result.kind {
                PathKind::Long => report.long_paths += 1,
                PathKind::Short => report.short_paths += 1,
            }
            if result.path.is_empty() {
                report.empty_paths += 1;
            }
            report.total_waypoints += result.path.len();
        }
        report.turns += 1;
    }
    report.elapsed_ms = started.elapsed().as_millis();
    debug!(turns = report.turns, elapsed_ms = report.elapsed_ms, "benchmark finished");
    report
}
