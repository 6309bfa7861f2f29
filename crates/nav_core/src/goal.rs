//! Path goals: the target area of a path request.

use serde::{Deserialize, Serialize};

use crate::geometry::{
    distance_to_square, nearest_point_on_square, point_is_in_square, test_square_square,
};
use crate::grid::{navcell_center, NAVCELL_SIZE};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Shape of a goal area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalType {
    /// A single point.
    Point,
    /// Inside a circle.
    Circle,
    /// Outside a circle.
    InvertedCircle,
    /// Inside an oriented rectangle.
    Square,
    /// Outside an oriented rectangle.
    InvertedSquare,
}

/// Target area of a path request.
///
/// Circles use `hw` as the radius. Squares use `u`/`v` as their axes and
/// `hw`/`hh` as their half-extents along them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathGoal {
    /// Goal shape.
    pub kind: GoalType,
    /// Center of the goal area.
    pub center: Vec2Fixed,
    /// Radius, or half-width along `u`.
    #[serde(with = "fixed_serde")]
    pub hw: Fixed,
    /// Half-height along `v`.
    #[serde(with = "fixed_serde")]
    pub hh: Fixed,
    /// First square axis.
    pub u: Vec2Fixed,
    /// Second square axis.
    pub v: Vec2Fixed,
    /// Maximum spacing between long-path waypoints (zero disables).
    #[serde(with = "fixed_serde")]
    pub max_dist: Fixed,
}

const AXIS_U: Vec2Fixed = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
const AXIS_V: Vec2Fixed = Vec2Fixed::new(Fixed::ZERO, Fixed::ONE);

impl PathGoal {
    /// Point goal.
    #[must_use]
    pub fn point(center: Vec2Fixed) -> Self {
        Self {
            kind: GoalType::Point,
            center,
            hw: Fixed::ZERO,
            hh: Fixed::ZERO,
            u: AXIS_U,
            v: AXIS_V,
            max_dist: Fixed::ZERO,
        }
    }

    /// Circle goal (`inverted` selects the outside of the circle).
    #[must_use]
    pub fn circle(center: Vec2Fixed, radius: Fixed, inverted: bool) -> Self {
        Self {
            kind: if inverted {
                GoalType::InvertedCircle
            } else {
                GoalType::Circle
            },
            hw: radius,
            hh: radius,
            ..Self::point(center)
        }
    }

    /// Oriented square goal (`inverted` selects the outside of the square).
    #[must_use]
    pub fn square(
        center: Vec2Fixed,
        u: Vec2Fixed,
        v: Vec2Fixed,
        hw: Fixed,
        hh: Fixed,
        inverted: bool,
    ) -> Self {
        Self {
            kind: if inverted {
                GoalType::InvertedSquare
            } else {
                GoalType::Square
            },
            center,
            hw,
            hh,
            u,
            v,
            max_dist: Fixed::ZERO,
        }
    }

    /// Same goal with a waypoint spacing limit.
    #[must_use]
    pub fn with_max_dist(mut self, max_dist: Fixed) -> Self {
        self.max_dist = max_dist;
        self
    }

    fn half(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.hw, self.hh)
    }

    /// Whether a point lies in the goal area (boundaries included).
    #[must_use]
    pub fn contains_point(&self, p: Vec2Fixed) -> bool {
        let rel = p - self.center;
        match self.kind {
            GoalType::Point => rel == Vec2Fixed::ZERO,
            GoalType::Circle => rel.length_squared() <= self.hw.saturating_mul(self.hw),
            GoalType::InvertedCircle => rel.length_squared() >= self.hw.saturating_mul(self.hw),
            GoalType::Square => point_is_in_square(rel, self.u, self.v, self.half()),
            GoalType::InvertedSquare => {
                !point_is_in_square(rel, self.u, self.v, self.half())
                    || distance_to_square(rel, self.u, self.v, self.half(), false) == Fixed::ZERO
            }
        }
    }

    /// Whether the navcell `(i, j)` overlaps any part of the goal area.
    #[must_use]
    pub fn navcell_contains_goal(&self, i: u16, j: u16) -> bool {
        self.rect_contains_goal(i, j, i, j)
    }

    /// Whether the navcell rectangle `[i0, i1] x [j0, j1]` (inclusive)
    /// overlaps any part of the goal area.
    #[must_use]
    pub fn rect_contains_goal(&self, i0: u16, j0: u16, i1: u16, j1: u16) -> bool {
        let lo = Vec2Fixed::new(Fixed::from_num(i0), Fixed::from_num(j0)).scale(NAVCELL_SIZE);
        let hi = Vec2Fixed::new(Fixed::from_num(i1) + Fixed::ONE, Fixed::from_num(j1) + Fixed::ONE)
            .scale(NAVCELL_SIZE);
        let rect_center = Vec2Fixed::new((lo.x + hi.x) / 2, (lo.y + hi.y) / 2);
        let rect_half = Vec2Fixed::new((hi.x - lo.x) / 2, (hi.y - lo.y) / 2);

        match self.kind {
            GoalType::Point => {
                let p = self.center;
                p.x >= lo.x && p.x < hi.x && p.y >= lo.y && p.y < hi.y
            }
            GoalType::Circle => {
                distance_to_square(self.center - rect_center, AXIS_U, AXIS_V, rect_half, true)
                    <= self.hw
            }
            GoalType::InvertedCircle => {
                // Overlaps the outside unless every corner is strictly inside.
                [lo, Vec2Fixed::new(hi.x, lo.y), hi, Vec2Fixed::new(lo.x, hi.y)]
                    .into_iter()
                    .any(|corner| corner.distance_squared(self.center) >= self.hw.saturating_mul(self.hw))
            }
            GoalType::Square => test_square_square(
                rect_center,
                AXIS_U,
                AXIS_V,
                rect_half,
                self.center,
                self.u,
                self.v,
                self.half(),
            ),
            GoalType::InvertedSquare => {
                [lo, Vec2Fixed::new(hi.x, lo.y), hi, Vec2Fixed::new(lo.x, hi.y)]
                    .into_iter()
                    .any(|corner| !point_is_in_square(corner - self.center, self.u, self.v, self.half()))
            }
        }
    }

    /// Whether the center of navcell `(i, j)` lies in the goal area.
    #[must_use]
    pub fn navcell_center_in_goal(&self, i: u16, j: u16) -> bool {
        match self.kind {
            GoalType::Point => self.navcell_contains_goal(i, j),
            _ => self.contains_point(navcell_center(i, j)),
        }
    }

    /// Distance from a point to the goal area (zero inside).
    #[must_use]
    pub fn distance_to_point(&self, p: Vec2Fixed) -> Fixed {
        let rel = p - self.center;
        match self.kind {
            GoalType::Point => rel.length(),
            GoalType::Circle => (rel.length() - self.hw).max(Fixed::ZERO),
            GoalType::InvertedCircle => (self.hw - rel.length()).max(Fixed::ZERO),
            GoalType::Square => distance_to_square(rel, self.u, self.v, self.half(), true),
            GoalType::InvertedSquare => {
                if point_is_in_square(rel, self.u, self.v, self.half()) {
                    distance_to_square(rel, self.u, self.v, self.half(), false)
                } else {
                    Fixed::ZERO
                }
            }
        }
    }

    /// The point of the goal area nearest to `p` (`p` itself when inside).
    #[must_use]
    pub fn nearest_point_on_goal(&self, p: Vec2Fixed) -> Vec2Fixed {
        let rel = p - self.center;
        match self.kind {
            GoalType::Point => self.center,
            GoalType::Circle | GoalType::InvertedCircle => {
                let inside = rel.length_squared() <= self.hw.saturating_mul(self.hw);
                if inside == (self.kind == GoalType::Circle) {
                    p
                } else if rel == Vec2Fixed::ZERO {
                    self.center + Vec2Fixed::new(self.hw, Fixed::ZERO)
                } else {
                    self.center + rel.normalize_to(self.hw)
                }
            }
            GoalType::Square | GoalType::InvertedSquare => {
                let inside = point_is_in_square(rel, self.u, self.v, self.half());
                if inside == (self.kind == GoalType::Square) {
                    p
                } else {
                    self.center + nearest_point_on_square(rel, self.u, self.v, self.half())
                }
            }
        }
    }
}
