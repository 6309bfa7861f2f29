//! What a unit has been asked to do, and which path result it waits for.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::path::{PathKind, PathTicket};

/// The current move order of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveRequest {
    /// Not moving.
    #[default]
    None,
    /// Get the unit's footprint within `[min_range, max_range]` of a point.
    Point {
        /// Destination point.
        position: Vec2Fixed,
        /// Minimum range (zero for none).
        #[serde(with = "fixed_serde")]
        min_range: Fixed,
        /// Maximum range (zero to reach the point itself).
        #[serde(with = "fixed_serde")]
        max_range: Fixed,
    },
    /// Get within `[min_range, max_range]` of another entity's footprint.
    Target {
        /// Entity to approach.
        entity: EntityId,
        /// Minimum range (zero for none).
        #[serde(with = "fixed_serde")]
        min_range: Fixed,
        /// Maximum range.
        #[serde(with = "fixed_serde")]
        max_range: Fixed,
    },
    /// Hold a position relative to a formation controller.
    Offset {
        /// Formation controller.
        entity: EntityId,
        /// Offset in the controller's frame (+y is its facing).
        offset: Vec2Fixed,
    },
}

impl MoveRequest {
    /// Whether any move is requested.
    #[must_use]
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Entity the request follows, if any.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        match *self {
            Self::Target { entity, .. } | Self::Offset { entity, .. } => Some(entity),
            Self::None | Self::Point { .. } => None,
        }
    }
}

/// The path request a unit is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpectedTicket {
    /// Ticket handed out by the orchestrator.
    pub ticket: PathTicket,
    /// Which pathfinder will answer.
    pub kind: PathKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_target() {
        assert!(!MoveRequest::None.is_some());
        let point = MoveRequest::Point {
            position: Vec2Fixed::from_ints(3, 4),
            min_range: Fixed::ZERO,
            max_range: Fixed::ONE,
        };
        assert!(point.is_some());
        assert_eq!(point.target(), None);
        let offset = MoveRequest::Offset {
            entity: 9,
            offset: Vec2Fixed::ZERO,
        };
        assert_eq!(offset.target(), Some(9));
    }
}
