//! # Navigation Core
//!
//! Deterministic pathfinding and unit movement for an RTS simulation.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! Given the same inputs, every peer computes bit-identical paths and
//! positions regardless of the number of path workers.
//!
//! ## Crate Structure
//!
//! - [`obstruction`] - Obstruction index: unit and static shapes, queries
//! - [`grid`] - Navcell grid and passability masks
//! - [`hierarchical`] - Chunk regions and global connectivity
//! - [`long_range`] - Jump point search with jump cache
//! - [`vertex`] - Short-range visibility-graph pathfinder
//! - [`pathfinder`] - Request orchestrator and worker pool
//! - [`motion`] - Per-unit movement state machines
//! - [`simulation`] - Turn loop façade over all of the above
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod error;
pub mod geometry;
pub mod goal;
pub mod grid;
pub mod hierarchical;
pub mod long_range;
pub mod math;
pub mod motion;
pub mod obstruction;
pub mod passability;
pub mod path;
pub mod pathfinder;
pub mod simulation;
pub mod terrain;
pub mod vertex;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::error::{NavError, Result};
    pub use crate::goal::{GoalType, PathGoal};
    pub use crate::grid::{NavcellGrid, PassClassMask, NAVCELLS_PER_TILE, NAVCELL_SIZE};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::motion::{MotionContext, MotionManager, MotionUpdate, MotionUpdateKind, PositionTable};
    pub use crate::obstruction::{ObstructionFilter, ObstructionFlags, ObstructionManager, ShapeTag};
    pub use crate::passability::PassabilityConfig;
    pub use crate::path::{PathKind, PathResultMessage, ShortPathRequest, WaypointPath};
    pub use crate::pathfinder::{Pathfinder, PathfinderConfig};
    pub use crate::simulation::{NavSimulation, TickEvents};
    pub use crate::terrain::{HeightmapTerrain, TerrainSource};
}
