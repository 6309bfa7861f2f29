//! Geometry kernels for oriented squares and circles.
//!
//! A "square" is an oriented rectangle described by its center, two
//! orthogonal unit axes `u` and `v`, and a half-size vector whose `x` is the
//! half-extent along `u` and whose `y` is the half-extent along `v`. Unless
//! noted otherwise, points are given relative to the square's center.
//!
//! Every boundary comparison is inclusive: touching counts as overlapping.

use crate::math::{Fixed, Vec2Fixed};

/// Returns true if `point` (relative to the center) is inside or on the
/// boundary of the square.
#[must_use]
pub fn point_is_in_square(point: Vec2Fixed, u: Vec2Fixed, v: Vec2Fixed, half: Vec2Fixed) -> bool {
    point.dot(u).abs() <= half.x && point.dot(v).abs() <= half.y
}

/// Half-extents of the axis-aligned bounding box of an oriented square.
#[must_use]
pub fn half_bounding_box(u: Vec2Fixed, v: Vec2Fixed, half: Vec2Fixed) -> Vec2Fixed {
    Vec2Fixed::new(
        u.x.abs() * half.x + v.x.abs() * half.y,
        u.y.abs() * half.x + v.y.abs() * half.y,
    )
}

/// Distance from a point to the boundary of a square.
///
/// Points inside the square return zero when `count_inside_as_zero` is set,
/// and the distance to the nearest edge otherwise.
#[must_use]
pub fn distance_to_square(
    point: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
    count_inside_as_zero: bool,
) -> Fixed {
    let du = point.dot(u).abs();
    let dv = point.dot(v).abs();

    if du <= half.x && dv <= half.y {
        if count_inside_as_zero {
            Fixed::ZERO
        } else {
            (half.x - du).min(half.y - dv)
        }
    } else if du <= half.x {
        dv - half.y
    } else if dv <= half.y {
        du - half.x
    } else {
        Vec2Fixed::new(du - half.x, dv - half.y).length()
    }
}

/// Distance from a point to the farthest corner of a square.
#[must_use]
pub fn max_distance_to_square(
    point: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> Fixed {
    let du = point.dot(u).abs();
    let dv = point.dot(v).abs();
    Vec2Fixed::new(du + half.x, dv + half.y).length()
}

/// Nearest point on the boundary of a square (relative to its center).
///
/// A point inside the square is pushed out to the nearest edge.
#[must_use]
pub fn nearest_point_on_square(
    point: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> Vec2Fixed {
    let pu = point.dot(u);
    let pv = point.dot(v);

    let mut cu = pu.clamp(-half.x, half.x);
    let mut cv = pv.clamp(-half.y, half.y);

    if pu.abs() < half.x && pv.abs() < half.y {
        if half.x - pu.abs() < half.y - pv.abs() {
            cu = if pu < Fixed::ZERO { -half.x } else { half.x };
        } else {
            cv = if pv < Fixed::ZERO { -half.y } else { half.y };
        }
    }

    u.scale(cu) + v.scale(cv)
}

/// The four corners of a square, counter-clockwise when `u` is clockwise of
/// `v` (the usual case, `u = (1,0)` and `v = (0,1)`).
#[must_use]
pub fn square_corners(
    center: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> [Vec2Fixed; 4] {
    let hu = u.scale(half.x);
    let hv = v.scale(half.y);
    [
        center - hu - hv,
        center + hu - hv,
        center + hu + hv,
        center - hu + hv,
    ]
}

/// Tests whether the segment `a -> b` (relative to the center) enters the
/// square.
///
/// One-sided: a segment that starts inside the square never collides, so
/// an object embedded in a shape can always move out of it.
#[must_use]
pub fn test_ray_square(
    a: Vec2Fixed,
    b: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> bool {
    if point_is_in_square(a, u, v, half) {
        return false;
    }
    if point_is_in_square(b, u, v, half) {
        return true;
    }

    // Liang-Barsky clip in the square's local frame.
    let a_local = Vec2Fixed::new(a.dot(u), a.dot(v));
    let d = Vec2Fixed::new(b.dot(u) - a_local.x, b.dot(v) - a_local.y);

    let mut t0 = Fixed::ZERO;
    let mut t1 = Fixed::ONE;
    for (p, q) in [
        (-d.x, a_local.x + half.x),
        (d.x, half.x - a_local.x),
        (-d.y, a_local.y + half.y),
        (d.y, half.y - a_local.y),
    ] {
        if p == Fixed::ZERO {
            if q < Fixed::ZERO {
                return false;
            }
            continue;
        }
        let t = q / p;
        if p < Fixed::ZERO {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return false;
        }
    }
    true
}

/// Tests whether the segment `a -> b` enters the circle of `radius` around
/// the origin. One-sided like [`test_ray_square`].
#[must_use]
pub fn test_ray_circle(a: Vec2Fixed, b: Vec2Fixed, radius: Fixed) -> bool {
    let r2 = radius.saturating_mul(radius);
    if a.length_squared() <= r2 {
        return false;
    }
    distance_point_to_segment(Vec2Fixed::ZERO, a, b) <= radius
}

/// Separating-axis overlap test between two oriented squares.
#[must_use]
pub fn test_square_square(
    c0: Vec2Fixed,
    u0: Vec2Fixed,
    v0: Vec2Fixed,
    half0: Vec2Fixed,
    c1: Vec2Fixed,
    u1: Vec2Fixed,
    v1: Vec2Fixed,
    half1: Vec2Fixed,
) -> bool {
    let d = c1 - c0;
    for axis in [u0, v0, u1, v1] {
        let r0 = u0.dot(axis).abs() * half0.x + v0.dot(axis).abs() * half0.y;
        let r1 = u1.dot(axis).abs() * half1.x + v1.dot(axis).abs() * half1.y;
        if d.dot(axis).abs() > r0 + r1 {
            return false;
        }
    }
    true
}

/// Distance between two oriented squares, zero when they overlap.
#[must_use]
pub fn distance_square_to_square(
    c0: Vec2Fixed,
    u0: Vec2Fixed,
    v0: Vec2Fixed,
    half0: Vec2Fixed,
    c1: Vec2Fixed,
    u1: Vec2Fixed,
    v1: Vec2Fixed,
    half1: Vec2Fixed,
) -> Fixed {
    if test_square_square(c0, u0, v0, half0, c1, u1, v1, half1) {
        return Fixed::ZERO;
    }
    // For disjoint convex polygons the closest pair always involves a vertex.
    let from_first = square_corners(c0, u0, v0, half0)
        .into_iter()
        .map(|p| distance_to_square(p - c1, u1, v1, half1, true));
    let from_second = square_corners(c1, u1, v1, half1)
        .into_iter()
        .map(|p| distance_to_square(p - c0, u0, v0, half0, true));
    from_first.chain(from_second).min().unwrap_or(Fixed::ZERO)
}

/// Largest distance between any point of the first square and any point of
/// the second.
#[must_use]
pub fn max_distance_square_to_square(
    c0: Vec2Fixed,
    u0: Vec2Fixed,
    v0: Vec2Fixed,
    half0: Vec2Fixed,
    c1: Vec2Fixed,
    u1: Vec2Fixed,
    v1: Vec2Fixed,
    half1: Vec2Fixed,
) -> Fixed {
    square_corners(c0, u0, v0, half0)
        .into_iter()
        .map(|p| max_distance_to_square(p - c1, u1, v1, half1))
        .max()
        .unwrap_or(Fixed::ZERO)
}

/// Distance from `p` to the segment `a -> b`.
#[must_use]
pub fn distance_point_to_segment(p: Vec2Fixed, a: Vec2Fixed, b: Vec2Fixed) -> Fixed {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == Fixed::ZERO {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(Fixed::ZERO, Fixed::ONE);
    p.distance(a + ab.scale(t))
}

/// Distance between two circles, zero when they overlap.
#[must_use]
pub fn distance_circle_to_circle(c0: Vec2Fixed, r0: Fixed, c1: Vec2Fixed, r1: Fixed) -> Fixed {
    (c0.distance(c1) - r0 - r1).max(Fixed::ZERO)
}

/// Largest distance between any point of two circles.
#[must_use]
pub fn max_distance_circle_to_circle(c0: Vec2Fixed, r0: Fixed, c1: Vec2Fixed, r1: Fixed) -> Fixed {
    c0.distance(c1) + r0 + r1
}

/// Distance between a circle and an oriented square, zero when they overlap.
#[must_use]
pub fn distance_circle_to_square(
    circle: Vec2Fixed,
    radius: Fixed,
    c: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> Fixed {
    (distance_to_square(circle - c, u, v, half, true) - radius).max(Fixed::ZERO)
}

/// Largest distance between any point of a circle and any point of a square.
#[must_use]
pub fn max_distance_circle_to_square(
    circle: Vec2Fixed,
    radius: Fixed,
    c: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
) -> Fixed {
    max_distance_to_square(circle - c, u, v, half) + radius
}

/// Squared length helper used for circle containment.
#[must_use]
pub fn within_radius(offset: Vec2Fixed, radius: Fixed) -> bool {
    offset.length_squared() <= radius.saturating_mul(radius)
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

    const U: Vec2Fixed = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
    const V: Vec2Fixed = Vec2Fixed::new(Fixed::ZERO, Fixed::ONE);

    #[test]
    fn test_point_in_square_is_inclusive() {
        let half = vec2(2, 1);
        assert!(point_is_in_square(vec2(2, 1), U, V, half));
        assert!(point_is_in_square(vec2(0, 0), U, V, half));
        assert!(!point_is_in_square(vec2(3, 0), U, V, half));
    }

    #[test]
    fn test_half_bounding_box_rotated() {
        // Quarter turn: the long side now runs along y.
        let u = vec2(0, 1);
        let v = vec2(-1, 0);
        let bb = half_bounding_box(u, v, vec2(5, 3));
        assert_eq!(bb, vec2(3, 5));
    }

    #[test]
    fn test_distance_to_square_regions() {
        let half = vec2(2, 2);
        assert_eq!(distance_to_square(vec2(5, 0), U, V, half, true), fixed(3));
        assert_eq!(distance_to_square(vec2(0, -6), U, V, half, true), fixed(4));
        assert_eq!(distance_to_square(vec2(5, 6), U, V, half, true), fixed(5));
        assert_eq!(distance_to_square(vec2(1, 0), U, V, half, true), Fixed::ZERO);
        assert_eq!(distance_to_square(vec2(1, 0), U, V, half, false), fixed(1));
    }

    #[test]
    fn test_nearest_point_on_square() {
        let half = vec2(2, 2);
        assert_eq!(nearest_point_on_square(vec2(5, 1), U, V, half), vec2(2, 1));
        assert_eq!(nearest_point_on_square(vec2(5, 5), U, V, half), vec2(2, 2));
        assert_eq!(nearest_point_on_square(vec2(0, 1), U, V, half), vec2(0, 2));
    }

    #[test]
    fn test_ray_square_is_one_sided() {
        let half = vec2(2, 2);
        // Crossing through from outside.
        assert!(test_ray_square(vec2(-5, 0), vec2(5, 0), U, V, half));
        // Leaving from inside.
        assert!(!test_ray_square(vec2(0, 0), vec2(5, 0), U, V, half));
        // Passing by.
        assert!(!test_ray_square(vec2(-5, 3), vec2(5, 3), U, V, half));
        // Grazing an edge counts.
        assert!(test_ray_square(vec2(-5, 2), vec2(5, 2), U, V, half));
        // Ending inside.
        assert!(test_ray_square(vec2(-5, 0), vec2(0, 0), U, V, half));
    }

    #[test]
    fn test_ray_circle_is_one_sided() {
        assert!(test_ray_circle(vec2(-5, 0), vec2(5, 0), fixed(1)));
        assert!(!test_ray_circle(vec2(0, 0), vec2(5, 0), fixed(1)));
        assert!(!test_ray_circle(vec2(-5, 2), vec2(5, 2), fixed(1)));
    }

    #[test]
    fn test_square_square_touching_collides() {
        let half = vec2(1, 1);
        assert!(test_square_square(vec2(0, 0), U, V, half, vec2(2, 0), U, V, half));
        let eps = Vec2Fixed::new(Fixed::from_num(2) + Fixed::DELTA, Fixed::ZERO);
        assert!(!test_square_square(vec2(0, 0), U, V, half, eps, U, V, half));
    }

    #[test]
    fn test_distance_square_to_square() {
        let half = vec2(1, 1);
        let d = distance_square_to_square(vec2(0, 0), U, V, half, vec2(5, 0), U, V, half);
        assert_eq!(d, fixed(3));
        let max = max_distance_square_to_square(vec2(0, 0), U, V, half, vec2(3, 0), U, V, half);
        assert_eq!(max, Vec2Fixed::from_ints(5, 2).length());
    }

    #[test]
    fn test_circle_distances() {
        assert_eq!(
            distance_circle_to_circle(vec2(0, 0), fixed(1), vec2(5, 0), fixed(2)),
            fixed(2)
        );
        assert_eq!(
            distance_circle_to_circle(vec2(0, 0), fixed(3), vec2(4, 0), fixed(2)),
            Fixed::ZERO
        );
        assert_eq!(
            distance_circle_to_square(vec2(6, 0), fixed(1), vec2(0, 0), U, V, vec2(2, 2)),
            fixed(3)
        );
    }

    #[test]
    fn test_distance_point_to_segment() {
        assert_eq!(distance_point_to_segment(vec2(0, 3), vec2(-4, 0), vec2(4, 0)), fixed(3));
        assert_eq!(distance_point_to_segment(vec2(7, 4), vec2(-4, 0), vec2(4, 0)), fixed(5));
    }
}
