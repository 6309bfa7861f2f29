//! Conversion of obstruction shapes into blocked navcell spans.
//!
//! A navcell is covered when its center lies within the clearance of the
//! shape (inclusive). Shapes are convex, so the covered cells of each row
//! form one contiguous span.

use crate::geometry::{distance_to_square, half_bounding_box, within_radius};
use crate::grid::{navcell_center, NavcellGrid, PassClassMask, NAVCELL_SIZE};
use crate::math::{Fixed, Vec2Fixed};

/// A run of covered navcells `i0..i1` (exclusive end) on row `j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// First covered column.
    pub i0: u16,
    /// One past the last covered column.
    pub i1: u16,
    /// Row.
    pub j: u16,
}

fn cell_range(lo: Fixed, hi: Fixed, max: u16) -> Option<(u16, u16)> {
    // Cells whose centers can lie inside [lo, hi].
    let half = Fixed::ONE / 2;
    let first = ((lo / NAVCELL_SIZE) - half).ceil().to_num::<i32>().max(0);
    let last = ((hi / NAVCELL_SIZE) - half).floor().to_num::<i32>();
    let last = last.min(i32::from(max) - 1);
    (first <= last).then(|| (first as u16, last as u16))
}

fn rasterize_with(
    center: Vec2Fixed,
    reach: Vec2Fixed,
    width: u16,
    height: u16,
    covers: impl Fn(Vec2Fixed) -> bool,
) -> Vec<Span> {
    let mut spans = Vec::new();
    let Some((i_min, i_max)) = cell_range(center.x - reach.x, center.x + reach.x, width) else {
        return spans;
    };
    let Some((j_min, j_max)) = cell_range(center.y - reach.y, center.y + reach.y, height) else {
        return spans;
    };
    for j in j_min..=j_max {
        let mut i0 = None;
        let mut i1 = i_min;
        for i in i_min..=i_max {
            if covers(navcell_center(i, j)) {
                i0.get_or_insert(i);
                i1 = i + 1;
            } else if i0.is_some() {
                break;
            }
        }
        if let Some(i0) = i0 {
            spans.push(Span { i0, i1, j });
        }
    }
    spans
}

/// Spans covered by an oriented rectangle grown by `clearance`.
#[must_use]
pub fn rasterize_rect_with_clearance(
    center: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
    clearance: Fixed,
    width: u16,
    height: u16,
) -> Vec<Span> {
    let bounds = half_bounding_box(u, v, half);
    let reach = Vec2Fixed::new(bounds.x + clearance, bounds.y + clearance);
    rasterize_with(center, reach, width, height, |p| {
        distance_to_square(p - center, u, v, half, true) <= clearance
    })
}

/// Spans covered by a circle grown by `clearance`.
#[must_use]
pub fn rasterize_circle_with_clearance(
    center: Vec2Fixed,
    radius: Fixed,
    clearance: Fixed,
    width: u16,
    height: u16,
) -> Vec<Span> {
    let r = radius + clearance;
    rasterize_with(center, Vec2Fixed::new(r, r), width, height, |p| {
        within_radius(p - center, r)
    })
}

/// Mark every cell of `spans` as blocked for `mask`.
pub fn stamp_spans(grid: &mut NavcellGrid, spans: &[Span], mask: PassClassMask) {
    for span in spans {
        for i in span.i0..span.i1 {
            *grid.get_mut(i, span.j) |= mask;
        }
    }
}
