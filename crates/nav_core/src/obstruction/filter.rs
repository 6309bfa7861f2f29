//! Obstruction query filters.

use serde::{Deserialize, Serialize};

use super::shape::{ObstructionFlags, ShapeTag};
use crate::components::{EntityId, INVALID_ENTITY};

/// Decides which shapes take part in a collision or range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstructionFilter {
    /// Accept every shape.
    Null,
    /// Reject moving units.
    StationaryOnly,
    /// Movement filter: skip the mover's own control group and shapes that
    /// do not block movement; moving units only count if `avoid_moving`.
    ControlGroupMovement {
        /// Whether moving units are obstacles.
        avoid_moving: bool,
        /// Control group of the mover.
        group: EntityId,
    },
    /// Skip shapes sharing either control group; require one of `mask`.
    SkipControlGroupsRequireFlags {
        /// First control group (never `INVALID_ENTITY`).
        group: EntityId,
        /// Second control group, or `INVALID_ENTITY`.
        group2: EntityId,
        /// At least one of these flags must be set.
        mask: ObstructionFlags,
    },
    /// Skip one specific shape.
    SkipTag(ShapeTag),
    /// Skip one specific shape; require one of `mask`.
    SkipTagRequireFlags {
        /// Shape to skip.
        tag: ShapeTag,
        /// At least one of these flags must be set.
        mask: ObstructionFlags,
    },
}

impl ObstructionFilter {
    /// Build a control-group filter, substituting a safe group when the
    /// caller passes the invalid sentinel.
    #[must_use]
    pub fn skip_control_groups_require_flags(
        group: EntityId,
        group2: EntityId,
        mask: ObstructionFlags,
    ) -> Self {
        if group == INVALID_ENTITY {
            tracing::error!("Control group filter built with an invalid primary group");
        }
        let (group, group2) = if group == INVALID_ENTITY {
            (group2, INVALID_ENTITY)
        } else {
            (group, group2)
        };
        Self::SkipControlGroupsRequireFlags { group, group2, mask }
    }

    /// Whether a shape with these properties passes the filter.
    #[must_use]
    pub fn test(
        &self,
        tag: ShapeTag,
        flags: ObstructionFlags,
        group: EntityId,
        group2: EntityId,
    ) -> bool {
        match *self {
            Self::Null => true,
            Self::StationaryOnly => !flags.contains(ObstructionFlags::MOVING),
            Self::ControlGroupMovement {
                avoid_moving,
                group: own,
            } => {
                if group == own || (group2 != INVALID_ENTITY && group2 == own) {
                    return false;
                }
                if !flags.contains(ObstructionFlags::BLOCK_MOVEMENT) {
                    return false;
                }
                if flags.contains(ObstructionFlags::MOVING) && !avoid_moving {
                    return false;
                }
                true
            }
            Self::SkipControlGroupsRequireFlags {
                group: g1,
                group2: g2,
                mask,
            } => {
                let shares = |g: EntityId| g != INVALID_ENTITY && (g == g1 || g == g2);
                if shares(group) || shares(group2) {
                    return false;
                }
                flags.intersects(mask)
            }
            Self::SkipTag(skip) => tag != skip,
            Self::SkipTagRequireFlags { tag: skip, mask } => tag != skip && flags.intersects(mask),
        }
    }
}
