//! Grid-bucketed spatial hash over bounding boxes.

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec2Fixed};

/// Default bucket size in world units.
pub const DEFAULT_DIVISION_SIZE: i32 = 32;

/// Buckets item ids by the grid squares their bounding box touches.
///
/// Queries may return items whose box does not actually overlap the query;
/// callers do the exact test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialSubdivision<T> {
    division_size: i32,
    divisions_w: u32,
    divisions_h: u32,
    buckets: Vec<Vec<T>>,
}

impl<T: Copy + Ord> SpatialSubdivision<T> {
    /// Create a subdivision covering `[0, width) x [0, height)` world units.
    #[must_use]
    pub fn new(width: Fixed, height: Fixed, division_size: i32) -> Self {
        let division_size = division_size.max(1);
        let count = |extent: Fixed| -> u32 {
            let units = extent.ceil().to_num::<i32>().max(1);
            ((units + division_size - 1) / division_size) as u32
        };
        let divisions_w = count(width);
        let divisions_h = count(height);
        Self {
            division_size,
            divisions_w,
            divisions_h,
            buckets: vec![Vec::new(); divisions_w as usize * divisions_h as usize],
        }
    }

    fn division_range(&self, min: Vec2Fixed, max: Vec2Fixed) -> (u32, u32, u32, u32) {
        let to_div = |v: Fixed, count: u32| -> u32 {
            let d = v.floor().to_num::<i32>().div_euclid(self.division_size);
            d.clamp(0, count as i32 - 1) as u32
        };
        (
            to_div(min.x, self.divisions_w),
            to_div(min.y, self.divisions_h),
            to_div(max.x, self.divisions_w),
            to_div(max.y, self.divisions_h),
        )
    }

    fn for_each_bucket(&mut self, min: Vec2Fixed, max: Vec2Fixed, mut f: impl FnMut(&mut Vec<T>)) {
        let (i0, j0, i1, j1) = self.division_range(min, max);
        for j in j0..=j1 {
            for i in i0..=i1 {
                let index = (j * self.divisions_w + i) as usize;
                f(&mut self.buckets[index]);
            }
        }
    }

    /// Insert an item covering the box `[min, max]`.
    pub fn add(&mut self, item: T, min: Vec2Fixed, max: Vec2Fixed) {
        self.for_each_bucket(min, max, |bucket| {
            if let Err(pos) = bucket.binary_search(&item) {
                bucket.insert(pos, item);
            }
        });
    }

    /// Remove an item previously added with the box `[min, max]`.
    pub fn remove(&mut self, item: T, min: Vec2Fixed, max: Vec2Fixed) {
        self.for_each_bucket(min, max, |bucket| {
            if let Ok(pos) = bucket.binary_search(&item) {
                bucket.remove(pos);
            }
        });
    }

    /// Move an item from one box to another.
    pub fn relocate(
        &mut self,
        item: T,
        old_min: Vec2Fixed,
        old_max: Vec2Fixed,
        new_min: Vec2Fixed,
        new_max: Vec2Fixed,
    ) {
        if self.division_range(old_min, old_max) == self.division_range(new_min, new_max) {
            return;
        }
        self.remove(item, old_min, old_max);
        self.add(item, new_min, new_max);
    }

    /// Sorted, de-duplicated items whose buckets overlap `[min, max]`.
    #[must_use]
    pub fn get_in_range(&self, min: Vec2Fixed, max: Vec2Fixed) -> Vec<T> {
        let (i0, j0, i1, j1) = self.division_range(min, max);
        let mut out = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                out.extend_from_slice(&self.buckets[(j * self.divisions_w + i) as usize]);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Sorted, de-duplicated items near a point.
    #[must_use]
    pub fn get_near(&self, pos: Vec2Fixed, range: Fixed) -> Vec<T> {
        let r = Vec2Fixed::new(range, range);
        self.get_in_range(pos - r, pos + r)
    }

    /// Every stored item, sorted.
    #[must_use]
    pub fn all(&self) -> Vec<T> {
        let mut out: Vec<T> = self.buckets.iter().flatten().copied().collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn subdivision() -> SpatialSubdivision<u32> {
        SpatialSubdivision::new(Fixed::from_num(256), Fixed::from_num(256), 32)
    }

    #[test]
    fn test_add_and_query() {
        let mut sub = subdivision();
        sub.add(1, vec2(10, 10), vec2(12, 12));
        sub.add(2, vec2(100, 100), vec2(140, 110));
        assert_eq!(sub.get_in_range(vec2(0, 0), vec2(20, 20)), vec![1]);
        assert_eq!(sub.get_in_range(vec2(130, 100), vec2(131, 101)), vec![2]);
        assert_eq!(sub.get_near(vec2(11, 11), Fixed::from_num(200)), vec![1, 2]);
    }

    #[test]
    fn test_relocate_and_remove() {
        let mut sub = subdivision();
        sub.add(7, vec2(10, 10), vec2(12, 12));
        sub.relocate(7, vec2(10, 10), vec2(12, 12), vec2(200, 200), vec2(202, 202));
        assert!(sub.get_in_range(vec2(0, 0), vec2(20, 20)).is_empty());
        assert_eq!(sub.get_in_range(vec2(190, 190), vec2(210, 210)), vec![7]);
        sub.remove(7, vec2(200, 200), vec2(202, 202));
        assert!(sub.all().is_empty());
    }

    #[test]
    fn test_out_of_bounds_boxes_are_clamped() {
        let mut sub = subdivision();
        sub.add(3, vec2(-50, -50), vec2(-40, -40));
        assert_eq!(sub.get_in_range(vec2(0, 0), vec2(1, 1)), vec![3]);
    }
}
