//! Obstruction shape records and handles.

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::geometry::half_bounding_box;
use crate::math::{fixed_serde, sin_cos, Fixed, Vec2Fixed};

/// Handle to an obstruction shape.
///
/// The variant says which arena the shape lives in; the index is never
/// reused after the shape is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShapeTag {
    /// A circular unit shape.
    Unit(u32),
    /// A rectangular static shape.
    Static(u32),
}

/// Obstruction behavior flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObstructionFlags(pub u8);

impl ObstructionFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Blocks unit movement.
    pub const BLOCK_MOVEMENT: Self = Self(1 << 0);
    /// Blocks placing foundations on top.
    pub const BLOCK_FOUNDATION: Self = Self(1 << 1);
    /// Blocks construction of buildings on top.
    pub const BLOCK_CONSTRUCTION: Self = Self(1 << 2);
    /// Stamped onto the navcell grid for pathfinding classes.
    pub const BLOCK_PATHFINDING: Self = Self(1 << 3);
    /// The unit is currently moving.
    pub const MOVING: Self = Self(1 << 4);
    /// The shape's entity is deleted when a building is constructed on it.
    pub const DELETE_UPON_CONSTRUCTION: Self = Self(1 << 5);

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set or clear the flags in `other`.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl std::ops::BitOr for ObstructionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A circular unit obstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitShape {
    /// Owning entity.
    pub entity: EntityId,
    /// Center position.
    pub center: Vec2Fixed,
    /// Radius (the unit's clearance).
    #[serde(with = "fixed_serde")]
    pub clearance: Fixed,
    /// Behavior flags.
    pub flags: ObstructionFlags,
    /// Control group.
    pub group: EntityId,
}

impl UnitShape {
    /// Half-extents of the bounding box.
    #[must_use]
    pub fn half_bounds(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.clearance, self.clearance)
    }
}

/// A rectangular static obstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticShape {
    /// Owning entity.
    pub entity: EntityId,
    /// Center position.
    pub center: Vec2Fixed,
    /// First (right-pointing) axis.
    pub u: Vec2Fixed,
    /// Second (forward-pointing) axis.
    pub v: Vec2Fixed,
    /// Half-width along `u`.
    #[serde(with = "fixed_serde")]
    pub hw: Fixed,
    /// Half-height along `v`.
    #[serde(with = "fixed_serde")]
    pub hh: Fixed,
    /// Behavior flags.
    pub flags: ObstructionFlags,
    /// Primary control group.
    pub group: EntityId,
    /// Secondary control group (`INVALID_ENTITY` if unused).
    pub group2: EntityId,
}

impl StaticShape {
    /// Half-size vector `(hw, hh)`.
    #[must_use]
    pub fn half(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.hw, self.hh)
    }

    /// Half-extents of the axis-aligned bounding box.
    #[must_use]
    pub fn half_bounds(&self) -> Vec2Fixed {
        half_bounding_box(self.u, self.v, self.half())
    }
}

/// Axes `(u, v)` of a rectangle rotated by heading `angle`.
#[must_use]
pub fn axes_from_angle(angle: Fixed) -> (Vec2Fixed, Vec2Fixed) {
    let (s, c) = sin_cos(angle);
    (Vec2Fixed::new(c, -s), Vec2Fixed::new(s, c))
}

/// Oriented-square view of any obstruction, as returned by queries.
///
/// Unit shapes are reported as axis-aligned squares of their clearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObstructionSquare {
    /// Shape handle.
    pub tag: ShapeTag,
    /// Owning entity.
    pub entity: EntityId,
    /// Center position.
    pub center: Vec2Fixed,
    /// First axis.
    pub u: Vec2Fixed,
    /// Second axis.
    pub v: Vec2Fixed,
    /// Half-width along `u`.
    #[serde(with = "fixed_serde")]
    pub hw: Fixed,
    /// Half-height along `v`.
    #[serde(with = "fixed_serde")]
    pub hh: Fixed,
}

impl ObstructionSquare {
    /// Half-size vector `(hw, hh)`.
    #[must_use]
    pub fn half(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.hw, self.hh)
    }

    pub(crate) fn from_unit(tag: ShapeTag, shape: &UnitShape) -> Self {
        Self {
            tag,
            entity: shape.entity,
            center: shape.center,
            u: Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
            v: Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
            hw: shape.clearance,
            hh: shape.clearance,
        }
    }

    pub(crate) fn from_static(tag: ShapeTag, shape: &StaticShape) -> Self {
        Self {
            tag,
            entity: shape.entity,
            center: shape.center,
            u: shape.u,
            v: shape.v,
            hw: shape.hw,
            hh: shape.hh,
        }
    }
}
