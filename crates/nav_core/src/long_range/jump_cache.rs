//! Precomputed straight-line jump lookups.
//!
//! For every row and column, and each of the four axis directions, the
//! cache stores the sorted coordinates where a straight jump must stop:
//! either a jump point (a forced neighbour appears) or an impassable cell.
//! A jump then becomes a binary search instead of a scan.

use crate::grid::{NavcellGrid, PassClassMask};

/// Whether `(x, y)` is a jump point for straight movement with step
/// `(dx, dy)` (exactly one of them non-zero): a side neighbour is open
/// while the one behind it was blocked.
#[must_use]
pub fn is_straight_jump_point(grid: &NavcellGrid, x: i32, y: i32, dx: i32, dy: i32, mask: PassClassMask) -> bool {
    let open = |a: i32, b: i32| grid.is_passable_at(a, b, mask);
    if dx != 0 {
        [-1, 1]
            .into_iter()
            .any(|s| open(x, y + s) && !open(x - dx, y + s))
    } else {
        [-1, 1]
            .into_iter()
            .any(|s| open(x + s, y) && !open(x + s, y - dy))
    }
}

/// One stop on a line: its coordinate and whether it is a jump point
/// (`true`) or an obstruction (`false`).
type Stop = (i32, bool);

/// Stops for one line in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LineStops {
    forward: Vec<Stop>,
    backward: Vec<Stop>,
}

impl LineStops {
    /// Jump forward from `start`; `goal` is a target coordinate on this line.
    fn jump_forward(&self, start: i32, goal: Option<i32>) -> Option<i32> {
        let index = self.forward.partition_point(|&(c, _)| c <= start);
        let (stop, jump) = self.forward.get(index).copied().unwrap_or((i32::MAX, false));
        if let Some(g) = goal.filter(|&g| g > start) {
            if g < stop || (jump && g == stop) {
                return Some(g);
            }
        }
        jump.then_some(stop)
    }

    /// Jump backward from `start`.
    fn jump_backward(&self, start: i32, goal: Option<i32>) -> Option<i32> {
        let index = self.backward.partition_point(|&(c, _)| c < start);
        let (stop, jump) = index
            .checked_sub(1)
            .and_then(|k| self.backward.get(k).copied())
            .unwrap_or((i32::MIN, false));
        if let Some(g) = goal.filter(|&g| g < start) {
            if g > stop || (jump && g == stop) {
                return Some(g);
            }
        }
        jump.then_some(stop)
    }
}

fn build_line(len: i32, passable: impl Fn(i32) -> bool, jump: impl Fn(i32, i32) -> bool) -> LineStops {
    let mut stops = LineStops::default();
    for k in -1..=len {
        if !passable(k) {
            stops.forward.push((k, false));
            stops.backward.push((k, false));
            continue;
        }
        if jump(k, 1) {
            stops.forward.push((k, true));
        }
        if jump(k, -1) {
            stops.backward.push((k, true));
        }
    }
    stops
}

/// Jump lookups for one passability class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpPointCache {
    rows: Vec<LineStops>,
    columns: Vec<LineStops>,
}

impl JumpPointCache {
    /// Build the cache for `mask` from the current grid.
    #[must_use]
    pub fn new(grid: &NavcellGrid, mask: PassClassMask) -> Self {
        let w = i32::from(grid.width());
        let h = i32::from(grid.height());
        let rows = (0..h)
            .map(|y| {
                build_line(
                    w,
                    |x| grid.is_passable_at(x, y, mask),
                    |x, d| is_straight_jump_point(grid, x, y, d, 0, mask),
                )
            })
            .collect();
        let columns = (0..w)
            .map(|x| {
                build_line(
                    h,
                    |y| grid.is_passable_at(x, y, mask),
                    |y, d| is_straight_jump_point(grid, x, y, 0, d, mask),
                )
            })
            .collect();
        Self { rows, columns }
    }

    /// Jump from `(x, y)` along the row with step `dx` (±1). Returns the
    /// column of the jump point or goal reached, `None` if blocked first.
    #[must_use]
    pub fn jump_horizontal(&self, x: i32, y: i32, dx: i32, goal: (i32, i32)) -> Option<i32> {
        let line = self.rows.get(usize::try_from(y).ok()?)?;
        let goal = (goal.1 == y).then_some(goal.0);
        if dx > 0 {
            line.jump_forward(x, goal)
        } else {
            line.jump_backward(x, goal)
        }
    }

    /// Jump from `(x, y)` along the column with step `dy` (±1).
    #[must_use]
    pub fn jump_vertical(&self, x: i32, y: i32, dy: i32, goal: (i32, i32)) -> Option<i32> {
        let line = self.columns.get(usize::try_from(x).ok()?)?;
        let goal = (goal.0 == x).then_some(goal.1);
        if dy > 0 {
            line.jump_forward(y, goal)
        } else {
            line.jump_backward(y, goal)
        }
    }
}
