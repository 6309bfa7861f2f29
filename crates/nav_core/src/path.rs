//! Waypoint paths and path requests.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::goal::PathGoal;
use crate::grid::PassClassMask;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Ticket correlating an asynchronous path request with its result.
pub type PathTicket = u32;

/// An ordered list of waypoints.
///
/// Stored end-first: the last element is the next waypoint to walk to, so
/// consuming a waypoint is a `pop` from the back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WaypointPath {
    waypoints: Vec<Vec2Fixed>,
}

impl WaypointPath {
    /// Empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from waypoints given in walking order (first waypoint first).
    #[must_use]
    pub fn from_walk_order(mut points: Vec<Vec2Fixed>) -> Self {
        points.reverse();
        Self { waypoints: points }
    }

    /// Build from waypoints stored end-first.
    #[must_use]
    pub fn from_end_first(points: Vec<Vec2Fixed>) -> Self {
        Self { waypoints: points }
    }

    /// Next waypoint to walk to.
    #[must_use]
    pub fn next(&self) -> Option<Vec2Fixed> {
        self.waypoints.last().copied()
    }

    /// Final waypoint of the path.
    #[must_use]
    pub fn last(&self) -> Option<Vec2Fixed> {
        self.waypoints.first().copied()
    }

    /// Remove and return the next waypoint.
    pub fn pop_next(&mut self) -> Option<Vec2Fixed> {
        self.waypoints.pop()
    }

    /// Insert a waypoint to be walked to before all others.
    pub fn push_next(&mut self, point: Vec2Fixed) {
        self.waypoints.push(point);
    }

    /// Append a waypoint after all others.
    pub fn push_last(&mut self, point: Vec2Fixed) {
        self.waypoints.insert(0, point);
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the path has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Drop all waypoints.
    pub fn clear(&mut self) {
        self.waypoints.clear();
    }

    /// Waypoints end-first (storage order).
    #[must_use]
    pub fn as_end_first(&self) -> &[Vec2Fixed] {
        &self.waypoints
    }

    /// Waypoints in walking order.
    pub fn walk_order(&self) -> impl Iterator<Item = Vec2Fixed> + '_ {
        self.waypoints.iter().rev().copied()
    }
}

/// Which pathfinder serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    /// Long-range grid search.
    Long,
    /// Short-range visibility search.
    Short,
}

/// Parameters of a long-range path request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LongPathRequest {
    /// Ticket assigned at submission.
    pub ticket: PathTicket,
    /// Origin.
    pub start: Vec2Fixed,
    /// Target area.
    pub goal: PathGoal,
    /// Passability class.
    pub pass_class: PassClassMask,
    /// Entity to notify with the result.
    pub notify: EntityId,
}

/// Parameters of a short-range path request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortPathRequest {
    /// Ticket assigned at submission.
    pub ticket: PathTicket,
    /// Origin.
    pub start: Vec2Fixed,
    /// Clearance of the moving unit.
    #[serde(with = "fixed_serde")]
    pub clearance: Fixed,
    /// Half-size of the search box around the origin.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Target area.
    pub goal: PathGoal,
    /// Passability class.
    pub pass_class: PassClassMask,
    /// Whether moving units count as obstructions.
    pub avoid_moving_units: bool,
    /// Control group whose members are ignored.
    pub group: EntityId,
    /// Entity to notify with the result.
    pub notify: EntityId,
}

/// A computed path delivered back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathResultMessage {
    /// Ticket of the originating request.
    pub ticket: PathTicket,
    /// Requester.
    pub notify: EntityId,
    /// Which pathfinder produced it.
    pub kind: PathKind,
    /// The waypoints (possibly empty).
    pub path: WaypointPath,
}
