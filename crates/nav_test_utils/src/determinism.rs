//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the navigation simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep peers must compute bit-identical paths and positions.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`nav_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID or ticket order.
//!
//! - **Worker scheduling**: Path requests are computed on a thread pool.
//!   Results are sorted by ticket, so the worker count must not matter.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual subsystem determinism
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios are reproducible
//! 4. **Worker tests**: Different pool sizes all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use nav_core::simulation::NavSimulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use nav_test_utils::determinism::verify_determinism;
/// use nav_test_utils::fixtures::flat_sim;
///
/// let result = verify_determinism(
///     2,
///     10,
///     || flat_sim(8, 1),
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`NavSimulation`] twice with identical setup and compare the
/// final state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> NavSimulation,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        |sim| sim.state_hash(),
    );
    result.is_deterministic
}

/// Run the same scenario with each worker count and collect the final
/// hashes. `setup_fn` receives the worker count.
///
/// Path results are ordered by ticket, so every entry should match.
pub fn run_with_worker_counts<F>(setup_fn: F, worker_counts: &[usize], num_ticks: u64) -> DeterminismResult
where
    F: Fn(usize) -> NavSimulation,
{
    let hashes: Vec<u64> = worker_counts
        .iter()
        .map(|&workers| {
            let mut sim = setup_fn(workers);
            for _ in 0..num_ticks {
                sim.tick();
            }
            sim.state_hash()
        })
        .collect();

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows under concurrent pools
/// competing for cores.
pub fn run_parallel_simulations_scoped<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> NavSimulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect::<Vec<u64>>()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> NavSimulation,
{
    find_divergence_between(&setup_fn, &setup_fn, num_ticks)
}

/// Step two differently configured simulations side by side and return the
/// first tick at which their events or state hashes differ.
///
/// Tick 0 compares the freshly built states.
pub fn find_divergence_between<A, B>(setup_a: A, setup_b: B, num_ticks: u64) -> Option<u64>
where
    A: Fn() -> NavSimulation,
    B: Fn() -> NavSimulation,
{
    let mut sim1 = setup_a();
    let mut sim2 = setup_b();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        let events1 = sim1.tick();
        let events2 = sim2.tick();

        if events1 != events2 || sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Serialize after `num_ticks`, restore, then run both copies for
/// `continue_ticks` more. True if they never diverge.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64, continue_ticks: u64) -> bool
where
    F: Fn() -> NavSimulation,
{
    let mut sim = setup_fn();

    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = NavSimulation::deserialize(&bytes) else {
        return false;
    };

    if sim.state_hash() != restored.state_hash() {
        return false;
    }
    (0..continue_ticks).all(|_| sim.tick() == restored.tick() && sim.state_hash() == restored.state_hash())
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for navigation testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of maps, shapes and orders.
pub mod strategies {
    use nav_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    /// Generate an integer coordinate inside a map of `size` navcells,
    /// keeping clear of the impassable border.
    pub fn arb_coord(size: i32) -> impl Strategy<Value = i32> {
        4i32..(size - 4)
    }

    /// Generate a point inside a map of `size` navcells.
    pub fn arb_point(size: i32) -> impl Strategy<Value = Vec2Fixed> {
        (arb_coord(size), arb_coord(size)).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// Generate a unit clearance between 1/4 and 4.
    pub fn arb_clearance() -> impl Strategy<Value = Fixed> {
        (1i32..=16).prop_map(|q| Fixed::from_num(q) / 4)
    }

    /// Generate a heading in `[0, 2π)`, quantized to 1/100 rad.
    pub fn arb_angle() -> impl Strategy<Value = Fixed> {
        (0i32..628).prop_map(|c| Fixed::from_num(c) / 100)
    }

    /// Parameters of a rectangular obstacle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RectParams {
        /// Center.
        pub center: Vec2Fixed,
        /// Heading.
        pub angle: Fixed,
        /// Extent along the heading's perpendicular.
        pub width: Fixed,
        /// Extent along the heading.
        pub depth: Fixed,
    }

    /// Generate a rectangle inside a map of `size` navcells.
    pub fn arb_rect(size: i32) -> impl Strategy<Value = RectParams> {
        (arb_point(size), arb_angle(), 1i32..12, 1i32..12).prop_map(|(center, angle, w, d)| RectParams {
            center,
            angle,
            width: Fixed::from_num(w),
            depth: Fixed::from_num(d),
        })
    }

    /// Generate a list of rectangles.
    pub fn arb_rect_list(size: i32, max_len: usize) -> impl Strategy<Value = Vec<RectParams>> {
        proptest::collection::vec(arb_rect(size), 0..max_len)
    }

    /// Generate a list of move orders `(start, destination)`.
    pub fn arb_orders(size: i32, max_len: usize) -> impl Strategy<Value = Vec<(Vec2Fixed, Vec2Fixed)>> {
        proptest::collection::vec((arb_point(size), arb_point(size)), 1..max_len)
    }
}
