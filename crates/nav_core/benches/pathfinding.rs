//! Pathfinding benchmarks for nav_core.
//!
//! Run with: `cargo bench -p nav_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nav_core::components::INVALID_ENTITY;
use nav_core::prelude::*;
use nav_core::simulation::STRUCTURE_FLAGS;

fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

fn vec2(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// 240x240 navcell map with a staggered row of walls.
fn walled_map(use_jump_point_cache: bool) -> NavSimulation {
    let mut sim = NavSimulation::flat(
        60,
        PathfinderConfig {
            workers: 1,
            use_jump_point_cache,
            ..PathfinderConfig::default()
        },
    );
    for k in 0..6 {
        let x = 30 + k * 32;
        let y = if k % 2 == 0 { 90 } else { 150 };
        sim.add_structure(1000 + k as u64, vec2(x, y), Fixed::ZERO, fixed(4), fixed(160), STRUCTURE_FLAGS);
    }
    sim.tick();
    sim
}

/// Long-range searches across the walled map, with and without the jump cache.
pub fn long_path_benchmark(c: &mut Criterion) {
    let goal = PathGoal::point(vec2(230, 120));
    for (name, cache) in [("long_path_jump_cache", true), ("long_path_no_cache", false)] {
        let sim = walled_map(cache);
        let mask = sim.pathfinder().pass_class("default");
        c.bench_function(name, |b| {
            b.iter(|| {
                black_box(sim.pathfinder().compute_path_immediate(vec2(10, 120), &goal, mask))
            })
        });
    }
}

/// Short-range search around a single obstruction.
pub fn short_path_benchmark(c: &mut Criterion) {
    let sim = walled_map(true);
    let request = ShortPathRequest {
        ticket: 0,
        start: vec2(20, 120),
        clearance: Fixed::from_num(0.8),
        range: fixed(32),
        goal: PathGoal::point(vec2(40, 120)),
        pass_class: sim.pathfinder().pass_class("default"),
        avoid_moving_units: false,
        group: INVALID_ENTITY,
        notify: INVALID_ENTITY,
    };
    c.bench_function("short_path", |b| {
        b.iter(|| black_box(sim.pathfinder().compute_short_path_immediate(sim.obstructions(), &request)))
    });
}

/// One turn with fifty units walking across the map.
pub fn tick_benchmark(c: &mut Criterion) {
    let template = MotionTemplate::new(fixed(9), "default");
    c.bench_function("tick_50_units", |b| {
        b.iter_batched(
            || {
                let mut sim = walled_map(true);
                for k in 0..50 {
                    let entity = k + 1;
                    let y = 20 + (k as i32) * 4;
                    if sim.spawn_unit(entity, vec2(10, y), &template).is_ok() {
                        sim.move_to_point_range(entity, vec2(230, y), Fixed::ZERO, Fixed::ZERO);
                    }
                }
                sim.tick();
                sim
            },
            |mut sim| black_box(sim.tick()),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, long_path_benchmark, short_path_benchmark, tick_benchmark);
criterion_main!(benches);
