//! Unit motion: per-entity movement state machines.
//!
//! Every moving entity owns a [`UnitMotion`]. The [`MotionManager`] runs them
//! once per turn in ascending entity order:
//!
//! 1. **Pre-move**: detect arrival or a vanished target; recompute the path
//!    if a followed target has moved away.
//! 2. **Move**: try a direct line to the (extrapolated) target, then walk the
//!    short path, then the long path, limited by speed and turn rate.
//! 3. **Push**: overlapping units push each other apart.
//! 4. **Post-move**: commit positions and obstruction shapes, recover from
//!    blocked movement and report [`MotionUpdate`]s.
//!
//! Path requests go through the orchestrator; results come back with
//! [`MotionManager::handle_path_results`] on the following turn.

mod manager;
mod positions;
mod pushing;
mod request;
mod unit;

pub use manager::MotionManager;
pub use positions::PositionTable;
pub use request::{ExpectedTicket, MoveRequest};
pub use unit::UnitMotion;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::Fixed;
use crate::obstruction::{ObstructionFlags, ObstructionManager};
use crate::pathfinder::Pathfinder;

/// Smallest half-size of a short path search box.
pub const SHORT_PATH_MIN_SEARCH_RANGE: Fixed = Fixed::const_from_int(12);

/// Largest half-size of a short path search box.
pub const SHORT_PATH_MAX_SEARCH_RANGE: Fixed = Fixed::const_from_int(56);

/// Search box growth per failed movement.
pub const SHORT_PATH_SEARCH_RANGE_INCREMENT: Fixed = Fixed::const_from_int(4);

/// Radius of the goal circle placed around an intermediate waypoint.
pub const SHORT_PATH_GOAL_RADIUS: Fixed = Fixed::const_from_int(6);

/// Goals closer than this are searched with the short pathfinder only.
pub const LONG_PATH_MIN_DIST: Fixed = Fixed::const_from_int(16);

/// Maximum length of a direct-line shortcut.
pub const DIRECT_PATH_RANGE: Fixed = Fixed::const_from_int(32);

/// A followed target that moved this far from the path's goal triggers a
/// recompute.
pub const CHECK_TARGET_MOVEMENT_MIN_DELTA: Fixed = Fixed::const_from_int(4);

/// Consecutive failures before the move is reported as failing.
pub const MAX_FAILED_MOVEMENTS: u8 = 35;

/// Failure count at which the unit backs up.
pub const BACKUP_HACK_DELAY: u8 = 10;

/// Failures before the unit starts alternating pathfinders.
pub const ALTERNATE_PATH_TYPE_DELAY: u8 = 3;

/// Period of the long-path retry once alternating.
pub const ALTERNATE_PATH_TYPE_EVERY: u8 = 6;

/// Path ends a known-imperfect path may reach before a full recompute.
pub const KNOWN_IMPERFECT_PATH_RESET_COUNTDOWN: u8 = 12;

/// Heading change that costs no time (radians).
pub const FREE_ROTATION: Fixed = Fixed::from_bits(1 << 29);

/// Pushing pressure at which a unit moves at half speed.
pub const PUSHING_MAX_PRESSURE: Fixed = Fixed::const_from_int(4);

/// Share of an overlap resolved per turn.
pub const PUSHING_STRENGTH: Fixed = Fixed::from_bits(1 << 31);

/// Obstruction flags of unit shapes.
pub const UNIT_OBSTRUCTION_FLAGS: ObstructionFlags = ObstructionFlags(
    ObstructionFlags::BLOCK_MOVEMENT.0 | ObstructionFlags::BLOCK_CONSTRUCTION.0,
);

/// Kind of motion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionUpdateKind {
    /// The unit is within range of its destination.
    ///
    /// Sent again every turn until the host calls `stop_moving`.
    LikelySuccess,
    /// The move cannot complete (target gone, too many failures, or the
    /// closest reachable point is reached).
    LikelyFailure,
    /// Movement was blocked this turn.
    Obstructed,
}

/// A notification for the host's message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionUpdate {
    /// The unit concerned.
    pub entity: EntityId,
    /// What happened.
    pub kind: MotionUpdateKind,
}

/// Shared state the motion system reads and writes.
pub struct MotionContext<'a> {
    /// Orchestrator for path requests and movement checks.
    pub pathfinder: &'a mut Pathfinder,
    /// Obstruction index holding unit shapes.
    pub obstructions: &'a mut ObstructionManager,
    /// Entity positions.
    pub positions: &'a mut PositionTable,
}
