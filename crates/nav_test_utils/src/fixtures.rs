//! Test fixtures and helpers.
//!
//! Pre-built maps, unit templates and seeded scenarios for consistent
//! testing and benchmarking.

use fixed::types::I32F32;
use nav_core::components::{EntityId, MotionTemplate};
use nav_core::math::{Fixed, Vec2Fixed};
use nav_core::pathfinder::PathfinderConfig;
use nav_core::simulation::{NavSimulation, STRUCTURE_FLAGS};
use tracing::debug;

/// First entity id used for scenario obstacles.
pub const OBSTACLE_ID_BASE: EntityId = 100_000;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a vector from integer coordinates.
#[must_use]
pub fn vec2(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Infantry-like template: speed 9, default class.
#[must_use]
pub fn soldier() -> MotionTemplate {
    MotionTemplate::new(fixed(9), "default")
}

/// Orchestrator config with a fixed worker count.
#[must_use]
pub fn config_with_workers(workers: usize) -> PathfinderConfig {
    PathfinderConfig {
        workers,
        ..PathfinderConfig::default()
    }
}

/// Flat map of `tiles x tiles` terrain tiles.
#[must_use]
pub fn flat_sim(tiles: u16, workers: usize) -> NavSimulation {
    NavSimulation::flat(tiles, config_with_workers(workers))
}

/// Add an axis-aligned wall and apply it to the grid.
pub fn add_wall(sim: &mut NavSimulation, entity: EntityId, center: Vec2Fixed, width: Fixed, depth: Fixed) {
    sim.add_structure(entity, center, Fixed::ZERO, width, depth, STRUCTURE_FLAGS);
    sim.tick();
}

/// Simple deterministic RNG for scenario generation.
#[derive(Debug, Clone)]
pub struct ScenarioRng {
    state: u64,
}

impl ScenarioRng {
    /// Seeded generator.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(0x5_DEEC_E66D).wrapping_add(11);
        self.state >> 16
    }

    /// Uniform integer in `[min, max)`; `min` when the range is empty.
    pub fn next_range(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let range = (i64::from(max) - i64::from(min)) as u64;
        min + (self.next_u64() % range) as i32
    }
}

/// Shape of a seeded scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioParams {
    /// Map side in terrain tiles.
    pub tiles: u16,
    /// Number of rectangular obstacles.
    pub obstacles: u32,
    /// Number of units.
    pub units: u32,
    /// RNG seed.
    pub seed: u64,
    /// Path worker count.
    pub workers: usize,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            tiles: 32,
            obstacles: 12,
            units: 16,
            seed: 12345,
            workers: 1,
        }
    }
}

/// Map with randomly placed and rotated rectangular obstacles, already
/// applied to the grid.
#[must_use]
pub fn obstacle_course(params: &ScenarioParams) -> NavSimulation {
    let mut sim = flat_sim(params.tiles, params.workers);
    let mut rng = ScenarioRng::new(params.seed);
    let size = i32::from(sim.obstructions().width());
    for k in 0..params.obstacles {
        let center = vec2(rng.next_range(8, size - 8), rng.next_range(8, size - 8));
        let angle = fixed(rng.next_range(0, 628)) / 100;
        let width = fixed(rng.next_range(2, 12));
        let depth = fixed(rng.next_range(2, 12));
        sim.add_structure(
            OBSTACLE_ID_BASE + EntityId::from(k),
            center,
            angle,
            width,
            depth,
            STRUCTURE_FLAGS,
        );
    }
    sim.tick();
    debug!(seed = params.seed, obstacles = params.obstacles, "obstacle course built");
    sim
}

/// A passable point for `class`, or `None` if the class is unknown or the
/// map has no passable cell.
pub fn random_passable_point(sim: &NavSimulation, rng: &mut ScenarioRng, class: &str) -> Option<Vec2Fixed> {
    let mask = sim.pathfinder().try_pass_class(class).ok()?;
    let size = i32::from(sim.obstructions().width());
    let p = vec2(rng.next_range(2, size - 2), rng.next_range(2, size - 2));
    sim.pathfinder().nearest_passable_point(p, mask)
}

/// Obstacle course with `params.units` soldiers, each ordered to a random
/// passable destination. Unit ids start at 1.
#[must_use]
pub fn crowd_scenario(params: &ScenarioParams) -> NavSimulation {
    let mut sim = obstacle_course(params);
    let mut rng = ScenarioRng::new(params.seed ^ 0xA5A5);
    let template = soldier();
    for k in 0..params.units {
        let entity = EntityId::from(k) + 1;
        let (Some(start), Some(goal)) = (
            random_passable_point(&sim, &mut rng, "default"),
            random_passable_point(&sim, &mut rng, "default"),
        ) else {
            continue;
        };
        if sim.spawn_unit(entity, start, &template).is_ok() {
            sim.move_to_point_range(entity, goal, Fixed::ZERO, Fixed::ZERO);
        }
    }
    sim
}
