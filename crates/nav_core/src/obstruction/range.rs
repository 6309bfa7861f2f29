//! Distance and range predicates between obstruction footprints.

use serde::{Deserialize, Serialize};

use crate::geometry::{
    distance_circle_to_circle, distance_circle_to_square, distance_square_to_square,
    distance_to_square, max_distance_circle_to_circle, max_distance_circle_to_square,
    max_distance_square_to_square, max_distance_to_square,
};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Slack applied to range comparisons so fixed-point rounding never turns a
/// borderline "in range" into a miss.
pub const DIST_TOLERANCE: Fixed = Fixed::from_bits(1 << 24);

/// Footprint used by distance queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeShape {
    /// An entity without an obstruction.
    Point(Vec2Fixed),
    /// A unit obstruction.
    Circle {
        /// Center.
        center: Vec2Fixed,
        /// Radius.
        #[serde(with = "fixed_serde")]
        radius: Fixed,
    },
    /// A static obstruction.
    Square {
        /// Center.
        center: Vec2Fixed,
        /// First axis.
        u: Vec2Fixed,
        /// Second axis.
        v: Vec2Fixed,
        /// Half-size along `(u, v)`.
        half: Vec2Fixed,
    },
}

impl RangeShape {
    /// Center of the footprint.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        match *self {
            Self::Point(p) => p,
            Self::Circle { center, .. } | Self::Square { center, .. } => center,
        }
    }

    /// Nearest distance from the footprint to a point (zero inside).
    #[must_use]
    pub fn distance_to_point(&self, p: Vec2Fixed) -> Fixed {
        match *self {
            Self::Point(q) => q.distance(p),
            Self::Circle { center, radius } => (center.distance(p) - radius).max(Fixed::ZERO),
            Self::Square { center, u, v, half } => distance_to_square(p - center, u, v, half, true),
        }
    }

    /// Farthest distance from the footprint to a point.
    #[must_use]
    pub fn max_distance_to_point(&self, p: Vec2Fixed) -> Fixed {
        match *self {
            Self::Point(q) => q.distance(p),
            Self::Circle { center, radius } => center.distance(p) + radius,
            Self::Square { center, u, v, half } => max_distance_to_square(p - center, u, v, half),
        }
    }
}

/// Nearest distance between two footprints, zero when they overlap.
#[must_use]
pub fn distance_between_shapes(a: &RangeShape, b: &RangeShape) -> Fixed {
    use RangeShape::{Circle, Point, Square};
    match (*a, *b) {
        (Point(p), other) | (other, Point(p)) => other.distance_to_point(p),
        (Circle { center: c0, radius: r0 }, Circle { center: c1, radius: r1 }) => {
            distance_circle_to_circle(c0, r0, c1, r1)
        }
        (Circle { center, radius }, Square { center: c, u, v, half })
        | (Square { center: c, u, v, half }, Circle { center, radius }) => {
            distance_circle_to_square(center, radius, c, u, v, half)
        }
        (
            Square { center: c0, u: u0, v: v0, half: h0 },
            Square { center: c1, u: u1, v: v1, half: h1 },
        ) => distance_square_to_square(c0, u0, v0, h0, c1, u1, v1, h1),
    }
}

/// Farthest distance between any two points of the footprints.
#[must_use]
pub fn max_distance_between_shapes(a: &RangeShape, b: &RangeShape) -> Fixed {
    use RangeShape::{Circle, Point, Square};
    match (*a, *b) {
        (Point(p), other) | (other, Point(p)) => other.max_distance_to_point(p),
        (Circle { center: c0, radius: r0 }, Circle { center: c1, radius: r1 }) => {
            max_distance_circle_to_circle(c0, r0, c1, r1)
        }
        (Circle { center, radius }, Square { center: c, u, v, half })
        | (Square { center: c, u, v, half }, Circle { center, radius }) => {
            max_distance_circle_to_square(center, radius, c, u, v, half)
        }
        (
            Square { center: c0, u: u0, v: v0, half: h0 },
            Square { center: c1, u: u1, v: v1, half: h1 },
        ) => max_distance_square_to_square(c0, u0, v0, h0, c1, u1, v1, h1),
    }
}

/// Shared range rule: negative `max` is unbounded; with `opposite` the
/// minimum is checked against the farthest distance instead of the nearest.
fn in_range(dist: Fixed, far: impl FnOnce() -> Fixed, min: Fixed, max: Fixed, opposite: bool) -> bool {
    if max >= Fixed::ZERO && dist > max + DIST_TOLERANCE {
        return false;
    }
    let reference = if opposite { far() } else { dist };
    reference >= min - DIST_TOLERANCE
}

/// Whether two footprints are within `[min, max]` of each other.
#[must_use]
pub fn are_shapes_in_range(
    a: &RangeShape,
    b: &RangeShape,
    min: Fixed,
    max: Fixed,
    opposite: bool,
) -> bool {
    in_range(
        distance_between_shapes(a, b),
        || max_distance_between_shapes(a, b),
        min,
        max,
        opposite,
    )
}

/// Whether a footprint is within `[min, max]` of a point.
#[must_use]
pub fn is_shape_in_point_range(
    shape: &RangeShape,
    p: Vec2Fixed,
    min: Fixed,
    max: Fixed,
    opposite: bool,
) -> bool {
    in_range(
        shape.distance_to_point(p),
        || shape.max_distance_to_point(p),
        min,
        max,
        opposite,
    )
}

/// Whether point `a` is within `[min, max]` of point `b`.
#[must_use]
pub fn is_point_in_point_range(a: Vec2Fixed, b: Vec2Fixed, min: Fixed, max: Fixed) -> bool {
    let dist = a.distance(b);
    in_range(dist, || dist, min, max, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn unit_square(center: Vec2Fixed, half: i32) -> RangeShape {
        RangeShape::Square {
            center,
            u: vec2(1, 0),
            v: vec2(0, 1),
            half: vec2(half, half),
        }
    }

    #[test]
    fn test_circle_distances() {
        let a = RangeShape::Circle { center: vec2(0, 0), radius: fixed(1) };
        let b = RangeShape::Circle { center: vec2(10, 0), radius: fixed(2) };
        assert_eq!(distance_between_shapes(&a, &b), fixed(7));
        assert_eq!(max_distance_between_shapes(&a, &b), fixed(13));
    }

    #[test]
    fn test_square_to_square_and_mixed() {
        let a = unit_square(vec2(0, 0), 1);
        let b = unit_square(vec2(5, 0), 1);
        assert_eq!(distance_between_shapes(&a, &b), fixed(3));
        let c = RangeShape::Circle { center: vec2(0, 6), radius: fixed(2) };
        assert_eq!(distance_between_shapes(&a, &c), fixed(3));
        assert_eq!(distance_between_shapes(&c, &a), fixed(3));
        assert_eq!(distance_between_shapes(&a, &RangeShape::Point(vec2(0, 4))), fixed(3));
    }

    #[test]
    fn test_negative_max_is_unbounded() {
        let a = RangeShape::Point(vec2(0, 0));
        let b = RangeShape::Point(vec2(1000, 0));
        assert!(are_shapes_in_range(&a, &b, Fixed::ZERO, -Fixed::ONE, false));
        assert!(!are_shapes_in_range(&a, &b, Fixed::ZERO, fixed(999), false));
    }

    #[test]
    fn test_tolerance_absorbs_rounding() {
        let a = vec2(0, 0);
        let b = Vec2Fixed::new(fixed(5) + Fixed::from_bits(1000), Fixed::ZERO);
        assert!(is_point_in_point_range(a, b, Fixed::ZERO, fixed(5)));
    }

    #[test]
    fn test_opposite_uses_far_side() {
        let square = unit_square(vec2(0, 0), 2);
        let p = vec2(3, 0);
        // Nearest side is 1 away, far side 5 away.
        assert!(!is_shape_in_point_range(&square, p, fixed(4), fixed(10), false));
        assert!(is_shape_in_point_range(&square, p, fixed(4), fixed(10), true));
    }
}
