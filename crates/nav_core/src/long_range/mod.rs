//! Long-range pathfinding: A* with jump point search over the navcell grid.
//!
//! Diagonal steps never cut corners: both orthogonal neighbours must be
//! passable. Goals are first made reachable through the hierarchical
//! pathfinder, so the search only runs when a route is known to exist; an
//! iteration cap still bounds it and yields the best partial path.

mod jump_cache;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::ops::Add;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::goal::PathGoal;
use crate::grid::{check_line_movement, navcell_center, nearest_navcell, GridDirtiness, NavcellGrid, PassClassMask};
use crate::hierarchical::HierarchicalPathfinder;
use crate::math::{Fixed, Vec2Fixed};
use crate::path::WaypointPath;

pub use jump_cache::{is_straight_jump_point, JumpPointCache};

/// Default cap on expanded jump points per search.
pub const DEFAULT_MAX_ITERATIONS: u32 = 200_000;

/// Integer path cost. One straight navcell step costs 2^16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PathCost(pub u32);

impl PathCost {
    /// Zero cost.
    pub const ZERO: Self = Self(0);
    /// Cost of one horizontal or vertical step.
    pub const STRAIGHT: Self = Self(65_536);
    /// Cost of one diagonal step, round(2^16 * sqrt(2)).
    pub const DIAGONAL: Self = Self(92_682);

    /// Octile distance over `di` columns and `dj` rows.
    #[must_use]
    pub fn octile(di: u32, dj: u32) -> Self {
        let diagonal = di.min(dj);
        let straight = di.max(dj) - diagonal;
        Self(
            diagonal
                .saturating_mul(Self::DIAGONAL.0)
                .saturating_add(straight.saturating_mul(Self::STRAIGHT.0)),
        )
    }

    fn between(a: Cell, b: Cell) -> Self {
        Self::octile(a.0.abs_diff(b.0), a.1.abs_diff(b.1))
    }
}

impl Add for PathCost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

type Cell = (i32, i32);

/// Node in the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    cell: Cell,
    f: PathCost,
    h: PathCost,
}

impl OpenNode {
    fn tie_breaker(&self) -> u64 {
        (u64::from(self.cell.1 as u32) << 32) | u64::from(self.cell.0 as u32)
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; nearer to the goal wins ties on f.
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.tie_breaker().cmp(&self.tie_breaker()))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    g: PathCost,
    parent: Option<Cell>,
    closed: bool,
}

/// Raw result of one jump point search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchOutcome {
    /// Jump points from start to end, both included.
    pub cells: Vec<Cell>,
    /// Whether the end is the goal.
    pub reached: bool,
    /// Cost of the route through `cells`.
    pub cost: PathCost,
    /// Number of expanded jump points.
    pub iterations: u32,
}

/// Jump primitives for one search, backed by the cache or by scanning.
struct Jumper<'a> {
    grid: &'a NavcellGrid,
    mask: PassClassMask,
    goal: Cell,
    cache: Option<&'a JumpPointCache>,
}

impl Jumper<'_> {
    fn open(&self, x: i32, y: i32) -> bool {
        self.grid.is_passable_at(x, y, self.mask)
    }

    fn scan_straight(&self, mut x: i32, mut y: i32, dx: i32, dy: i32) -> Option<Cell> {
        loop {
            x += dx;
            y += dy;
            if !self.open(x, y) {
                return None;
            }
            if (x, y) == self.goal || is_straight_jump_point(self.grid, x, y, dx, dy, self.mask) {
                return Some((x, y));
            }
        }
    }

    fn jump_straight(&self, x: i32, y: i32, dx: i32, dy: i32) -> Option<Cell> {
        match self.cache {
            Some(cache) if dx != 0 => cache.jump_horizontal(x, y, dx, self.goal).map(|nx| (nx, y)),
            Some(cache) => cache.jump_vertical(x, y, dy, self.goal).map(|ny| (x, ny)),
            None => self.scan_straight(x, y, dx, dy),
        }
    }

    fn jump_diagonal(&self, mut x: i32, mut y: i32, dx: i32, dy: i32) -> Option<Cell> {
        loop {
            if !self.open(x + dx, y) || !self.open(x, y + dy) || !self.open(x + dx, y + dy) {
                return None;
            }
            x += dx;
            y += dy;
            if (x, y) == self.goal
                || self.jump_straight(x, y, dx, 0).is_some()
                || self.jump_straight(x, y, 0, dy).is_some()
            {
                return Some((x, y));
            }
        }
    }

    fn jump(&self, from: Cell, (dx, dy): Cell) -> Option<Cell> {
        if dx != 0 && dy != 0 {
            self.jump_diagonal(from.0, from.1, dx, dy)
        } else {
            self.jump_straight(from.0, from.1, dx, dy)
        }
    }

    /// Directions worth exploring from `cell` given where it was reached from.
    fn directions(&self, (x, y): Cell, parent: Option<Cell>) -> Vec<Cell> {
        let Some((px, py)) = parent else {
            return vec![(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];
        };
        let dx = (x - px).signum();
        let dy = (y - py).signum();
        if dx != 0 && dy != 0 {
            return vec![(dx, 0), (0, dy), (dx, dy)];
        }
        let mut dirs = Vec::with_capacity(5);
        if dx != 0 {
            dirs.push((dx, 0));
            for s in [-1, 1] {
                if self.open(x, y + s) && !self.open(x - dx, y + s) {
                    dirs.push((0, s));
                    dirs.push((dx, s));
                }
            }
        } else {
            dirs.push((0, dy));
            for s in [-1, 1] {
                if self.open(x + s, y) && !self.open(x + s, y - dy) {
                    dirs.push((s, 0));
                    dirs.push((s, dy));
                }
            }
        }
        dirs
    }
}

/// The long-range pathfinder.
#[derive(Debug, Clone)]
pub struct LongPathfinder {
    use_jump_cache: bool,
    max_iterations: u32,
    jump_caches: BTreeMap<PassClassMask, OnceLock<JumpPointCache>>,
}

impl Default for LongPathfinder {
    fn default() -> Self {
        Self::new()
    }
}

impl LongPathfinder {
    /// Pathfinder with the jump point cache enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_jump_cache: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            jump_caches: BTreeMap::new(),
        }
    }

    /// Enable or disable the jump point cache.
    pub fn set_use_jump_point_cache(&mut self, enabled: bool) {
        self.use_jump_cache = enabled;
    }

    /// Whether the jump point cache is in use.
    #[must_use]
    pub fn uses_jump_point_cache(&self) -> bool {
        self.use_jump_cache
    }

    /// Cap on expanded jump points per search.
    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        self.max_iterations = max_iterations;
    }

    /// Reset for a newly loaded grid serving the given classes. Caches are
    /// rebuilt on first use.
    pub fn reload(&mut self, grid: &NavcellGrid, masks: impl IntoIterator<Item = PassClassMask>) {
        self.jump_caches = masks.into_iter().map(|mask| (mask, OnceLock::new())).collect();
        debug!(
            width = grid.width(),
            height = grid.height(),
            classes = self.jump_caches.len(),
            "long-range pathfinder reloaded"
        );
    }

    /// Invalidate caches after the grid changed.
    pub fn update(&mut self, dirtiness: &GridDirtiness) {
        if !dirtiness.dirty {
            return;
        }
        for cache in self.jump_caches.values_mut() {
            cache.take();
        }
    }

    fn jump_cache(&self, grid: &NavcellGrid, mask: PassClassMask) -> Option<&JumpPointCache> {
        if !self.use_jump_cache {
            return None;
        }
        self.jump_caches
            .get(&mask)
            .map(|cell| cell.get_or_init(|| JumpPointCache::new(grid, mask)))
    }

    /// Jump point A* between two navcells.
    pub(crate) fn search(&self, grid: &NavcellGrid, mask: PassClassMask, start: Cell, goal: Cell) -> SearchOutcome {
        let jumper = Jumper {
            grid,
            mask,
            goal,
            cache: self.jump_cache(grid, mask),
        };

        let mut open = BinaryHeap::new();
        let mut records: HashMap<Cell, NodeRecord> = HashMap::new();
        let start_h = PathCost::between(start, goal);
        records.insert(
            start,
            NodeRecord {
                g: PathCost::ZERO,
                parent: None,
                closed: false,
            },
        );
        open.push(OpenNode {
            cell: start,
            f: start_h,
            h: start_h,
        });

        let mut best = (start_h, start.1, start.0);
        let mut reached = false;
        let mut iterations = 0u32;

        while let Some(node) = open.pop() {
            let Some(record) = records.get_mut(&node.cell) else {
                continue;
            };
            if record.closed {
                continue;
            }
            record.closed = true;
            let (g, parent) = (record.g, record.parent);

            if node.cell == goal {
                reached = true;
                break;
            }
            best = best.min((node.h, node.cell.1, node.cell.0));
            if iterations >= self.max_iterations {
                break;
            }
            iterations += 1;

            for dir in jumper.directions(node.cell, parent) {
                let Some(next) = jumper.jump(node.cell, dir) else {
                    continue;
                };
                let next_g = g + PathCost::between(node.cell, next);
                let improved = records.get(&next).map_or(true, |r| !r.closed && next_g < r.g);
                if !improved {
                    continue;
                }
                records.insert(
                    next,
                    NodeRecord {
                        g: next_g,
                        parent: Some(node.cell),
                        closed: false,
                    },
                );
                let h = PathCost::between(next, goal);
                open.push(OpenNode {
                    cell: next,
                    f: next_g + h,
                    h,
                });
            }
        }

        let end = if reached { goal } else { (best.2, best.1) };
        let mut cells = vec![end];
        let mut cursor = end;
        while let Some(parent) = records.get(&cursor).and_then(|r| r.parent) {
            cells.push(parent);
            cursor = parent;
        }
        cells.reverse();
        let cost = records.get(&end).map_or(PathCost::ZERO, |r| r.g);

        SearchOutcome {
            cells,
            reached,
            cost,
            iterations,
        }
    }

    /// Compute a path from `(x0, z0)` towards `goal`.
    ///
    /// The goal is made reachable first. If the origin navcell is impassable
    /// the search starts from the nearest passable navcell, which becomes
    /// the first waypoint. Returns an empty path when no passable navcell
    /// exists at all.
    #[must_use]
    pub fn compute_path(
        &self,
        grid: &NavcellGrid,
        hier: &HierarchicalPathfinder,
        x0: Fixed,
        z0: Fixed,
        goal: &PathGoal,
        mask: PassClassMask,
    ) -> WaypointPath {
        let origin = Vec2Fixed::new(x0, z0);
        let (i0, j0) = nearest_navcell(x0, z0, grid.width(), grid.height());

        let mut walk = Vec::new();
        let (si, sj) = if grid.is_passable_at(i32::from(i0), i32::from(j0), mask) {
            (i0, j0)
        } else {
            let Some(cell) = hier.find_nearest_passable_navcell(i0, j0, mask) else {
                trace!(i0, j0, "no passable navcell for long path");
                return WaypointPath::new();
            };
            walk.push(navcell_center(cell.0, cell.1));
            cell
        };

        let (mut target, _) = hier.make_goal_reachable(si, sj, goal, mask);
        let (mut gi, mut gj) = nearest_navcell(target.center.x, target.center.y, grid.width(), grid.height());
        if hier.global_region(gi, gj, mask) != hier.global_region(si, sj, mask) {
            // The snapped point fell just outside its navcell; snap again.
            target = hier.make_goal_reachable(si, sj, &PathGoal::point(target.center), mask).0;
            (gi, gj) = nearest_navcell(target.center.x, target.center.y, grid.width(), grid.height());
        }

        let outcome = self.search(
            grid,
            mask,
            (i32::from(si), i32::from(sj)),
            (i32::from(gi), i32::from(gj)),
        );

        for &(i, j) in outcome.cells.iter().skip(1) {
            walk.push(navcell_center(i as u16, j as u16));
        }
        if outcome.reached {
            if outcome.cells.len() > 1 {
                walk.pop();
            }
            walk.push(target.center);
        }

        let keep_first = (si, sj) != (i0, j0);
        let mut points = simplify_waypoints(origin, &walk, keep_first, mask, grid);
        if goal.max_dist > Fixed::ZERO {
            points = space_waypoints(origin, &points, goal.max_dist);
        }

        trace!(
            iterations = outcome.iterations,
            reached = outcome.reached,
            waypoints = points.len(),
            "long path computed"
        );
        WaypointPath::from_walk_order(points)
    }
}

/// Drop waypoints whose neighbours can see each other on the grid.
fn simplify_waypoints(
    origin: Vec2Fixed,
    points: &[Vec2Fixed],
    keep_first: bool,
    mask: PassClassMask,
    grid: &NavcellGrid,
) -> Vec<Vec2Fixed> {
    let mut kept = Vec::with_capacity(points.len());
    let mut anchor = origin;
    for (k, &point) in points.iter().enumerate() {
        if !(k == 0 && keep_first) {
            if let Some(&after) = points.get(k + 1) {
                if check_line_movement(anchor, after, mask, grid) {
                    continue;
                }
            }
        }
        kept.push(point);
        anchor = point;
    }
    kept
}

/// Subdivide legs so that no gap, including the first leg from `origin`,
/// exceeds `max_dist`.
fn space_waypoints(origin: Vec2Fixed, points: &[Vec2Fixed], max_dist: Fixed) -> Vec<Vec2Fixed> {
    let mut spaced = Vec::with_capacity(points.len());
    let mut prev = origin;
    for &point in points {
        let dist = prev.distance(point);
        if dist > max_dist {
            let pieces = (dist / max_dist).ceil().to_num::<i32>();
            for k in 1..pieces {
                spaced.push(prev.lerp(point, Fixed::from_num(k) / Fixed::from_num(pieces)));
            }
        }
        spaced.push(point);
        prev = point;
    }
    spaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use proptest::prelude::*;

    const CLASS: PassClassMask = 1;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn center(i: u16, j: u16) -> Vec2Fixed {
        navcell_center(i, j)
    }

    fn bordered_grid(w: u16, h: u16) -> NavcellGrid {
        let mut grid: NavcellGrid = Grid::new(w, h);
        for i in 0..w {
            grid.set(i, 0, CLASS);
            grid.set(i, h - 1, CLASS);
        }
        for j in 0..h {
            grid.set(0, j, CLASS);
            grid.set(w - 1, j, CLASS);
        }
        grid
    }

    fn setup(grid: &NavcellGrid) -> (LongPathfinder, HierarchicalPathfinder) {
        let mut hier = HierarchicalPathfinder::new();
        hier.recompute_masks(grid, &[CLASS]);
        let mut long = LongPathfinder::new();
        long.reload(grid, [CLASS]);
        (long, hier)
    }

    fn legs_are_clear(origin: Vec2Fixed, path: &WaypointPath, grid: &NavcellGrid) -> bool {
        let mut prev = origin;
        path.walk_order().all(|p| {
            let ok = check_line_movement(prev, p, CLASS, grid);
            prev = p;
            ok
        })
    }

    /// Reference 8-connected Dijkstra without corner cutting.
    fn dijkstra_cost(grid: &NavcellGrid, start: Cell, goal: Cell) -> Option<PathCost> {
        let mut dist: HashMap<Cell, PathCost> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(start, PathCost::ZERO);
        heap.push(std::cmp::Reverse((PathCost::ZERO, start)));
        let open = |x: i32, y: i32| grid.is_passable_at(x, y, CLASS);
        while let Some(std::cmp::Reverse((d, (x, y)))) = heap.pop() {
            if (x, y) == goal {
                return Some(d);
            }
            if dist.get(&(x, y)).is_some_and(|&best| best < d) {
                continue;
            }
            for dx in -1..=1 {
                for dy in -1..=1 {
                    if (dx, dy) == (0, 0) || !open(x + dx, y + dy) {
                        continue;
                    }
                    if dx != 0 && dy != 0 && (!open(x + dx, y) || !open(x, y + dy)) {
                        continue;
                    }
                    let step = if dx != 0 && dy != 0 { PathCost::DIAGONAL } else { PathCost::STRAIGHT };
                    let nd = d + step;
                    if dist.get(&(x + dx, y + dy)).map_or(true, |&old| nd < old) {
                        dist.insert((x + dx, y + dy), nd);
                        heap.push(std::cmp::Reverse((nd, (x + dx, y + dy))));
                    }
                }
            }
        }
        None
    }

    #[test]
    fn test_octile_cost() {
        assert_eq!(PathCost::octile(3, 0), PathCost(3 * 65_536));
        assert_eq!(PathCost::octile(2, 5), PathCost(2 * 92_682 + 3 * 65_536));
    }

    #[test]
    fn test_open_field_is_a_single_leg() {
        let grid = bordered_grid(32, 32);
        let (long, hier) = setup(&grid);
        let goal = PathGoal::point(center(25, 20));
        let path = long.compute_path(&grid, &hier, fixed(5), fixed(5), &goal, CLASS);
        assert_eq!(path.walk_order().collect::<Vec<_>>(), vec![center(25, 20)]);
    }

    #[test]
    fn test_path_around_wall() {
        let mut grid = bordered_grid(40, 40);
        for j in 0..32 {
            grid.set(20, j, CLASS);
        }
        let (long, hier) = setup(&grid);
        let origin = center(5, 5);
        let goal = PathGoal::point(center(35, 5));
        let path = long.compute_path(&grid, &hier, origin.x, origin.y, &goal, CLASS);
        assert!(path.len() >= 2);
        assert_eq!(path.last(), Some(center(35, 5)));
        assert!(legs_are_clear(origin, &path, &grid));
        assert!(path.walk_order().any(|p| p.y > fixed(32)));
    }

    #[test]
    fn test_unreachable_goal_ends_in_reachable_region() {
        let mut grid = bordered_grid(40, 40);
        for k in 25..=35 {
            grid.set(k, 25, CLASS);
            grid.set(k, 35, CLASS);
            grid.set(25, k, CLASS);
            grid.set(35, k, CLASS);
        }
        let (long, hier) = setup(&grid);
        let goal = PathGoal::point(center(30, 30));
        let path = long.compute_path(&grid, &hier, fixed(5), fixed(5), &goal, CLASS);
        let end = path.last().expect("partial path");
        let (ei, ej) = nearest_navcell(end.x, end.y, 40, 40);
        assert_eq!(hier.global_region(ei, ej, CLASS), hier.global_region(5, 5, CLASS));
        assert_eq!(end, center(30, 24));
    }

    #[test]
    fn test_impassable_origin_adds_exit_waypoint() {
        let mut grid = bordered_grid(32, 32);
        for i in 8..=10 {
            for j in 8..=10 {
                grid.set(i, j, CLASS);
            }
        }
        let (long, hier) = setup(&grid);
        let origin = center(9, 9);
        let goal = PathGoal::point(center(20, 20));
        let path = long.compute_path(&grid, &hier, origin.x, origin.y, &goal, CLASS);
        let first = path.next().expect("path");
        let (fi, fj) = nearest_navcell(first.x, first.y, 32, 32);
        assert!(grid.is_passable_at(i32::from(fi), i32::from(fj), CLASS));
        assert!(first.distance(origin) < fixed(3));
        assert_eq!(path.last(), Some(center(20, 20)));
    }

    #[test]
    fn test_max_dist_spaces_waypoints() {
        let grid = bordered_grid(64, 64);
        let (long, hier) = setup(&grid);
        let origin = center(4, 4);
        let goal = PathGoal::point(center(50, 4)).with_max_dist(fixed(8));
        let path = long.compute_path(&grid, &hier, origin.x, origin.y, &goal, CLASS);
        let mut prev = origin;
        for p in path.walk_order() {
            assert!(prev.distance(p) <= fixed(8) + Fixed::DELTA * 16);
            prev = p;
        }
        assert_eq!(path.last(), Some(center(50, 4)));
        assert!(path.len() >= 6);
    }

    #[test]
    fn test_iteration_cap_returns_partial_path() {
        let mut grid = bordered_grid(48, 48);
        // Comb of walls forcing many expansions.
        for k in (6..42).step_by(6) {
            for j in 1..40 {
                grid.set(k, if k % 12 == 0 { j } else { 47 - j }, CLASS);
            }
        }
        let (mut long, _) = setup(&grid);
        long.set_max_iterations(2);
        let outcome = long.search(&grid, CLASS, (2, 2), (45, 45));
        assert!(!outcome.reached);
        assert!(outcome.iterations <= 2);

        long.set_max_iterations(DEFAULT_MAX_ITERATIONS);
        let full = long.search(&grid, CLASS, (2, 2), (45, 45));
        assert!(full.reached);
        assert_eq!(Some(full.cost), dijkstra_cost(&grid, (2, 2), (45, 45)));
    }

    #[test]
    fn test_cache_invalidated_on_update() {
        let mut grid = bordered_grid(32, 32);
        let (mut long, _) = setup(&grid);
        let before = long.search(&grid, CLASS, (2, 16), (29, 16));
        assert_eq!(before.cells, vec![(2, 16), (29, 16)]);

        for j in 1..31 {
            if j != 3 {
                grid.set(16, j, CLASS);
            }
        }
        let mut dirtiness = GridDirtiness::new(32, 32);
        dirtiness.mark(16, 16);
        long.update(&dirtiness);
        let after = long.search(&grid, CLASS, (2, 16), (29, 16));
        assert!(after.reached);
        assert!(after.cells.iter().any(|&(_, y)| y == 3));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Jump point search finds optimal routes, with or without the cache.
        #[test]
        fn prop_jps_matches_dijkstra(
            blocked in proptest::collection::vec((1u16..23, 1u16..23), 0..120),
            start in (1i32..23, 1i32..23),
            goal in (1i32..23, 1i32..23),
        ) {
            let mut grid = bordered_grid(24, 24);
            for (i, j) in blocked {
                grid.set(i, j, CLASS);
            }
            prop_assume!(grid.is_passable_at(start.0, start.1, CLASS));
            prop_assume!(grid.is_passable_at(goal.0, goal.1, CLASS));
            let expected = dijkstra_cost(&grid, start, goal);
            prop_assume!(expected.is_some());

            let (mut long, _) = setup(&grid);
            let cached = long.search(&grid, CLASS, start, goal);
            long.set_use_jump_point_cache(false);
            let scanned = long.search(&grid, CLASS, start, goal);

            prop_assert!(cached.reached);
            prop_assert_eq!(Some(cached.cost), expected);
            prop_assert_eq!(&cached.cells, &scanned.cells);
        }
    }
}
