//! Hierarchical reachability over the navcell grid.
//!
//! The grid is cut into [`CHUNK_SIZE`] chunks. Inside each chunk, every
//! passability class gets its 4-connected regions labelled; regions touching
//! across a chunk border are linked by edges, and the transitive closure of
//! those edges assigns global region ids. Two navcells are mutually
//! reachable iff they share a global region id.

mod chunk;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::goal::{GoalType, PathGoal};
use crate::grid::{navcell_center, nearest_navcell, Grid, GridDirtiness, NavcellGrid, PassClassMask};
use crate::passability::PassabilityClasses;

pub use chunk::{Chunk, RegionBounds, RegionId, CHUNK_SIZE};

/// Global region id. 0 means "no region" (impassable).
pub type GlobalRegionId = u32;

/// Per-class connectivity tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ClassRegions {
    chunks: Vec<Chunk>,
    edges: BTreeMap<RegionId, BTreeSet<RegionId>>,
    global: BTreeMap<RegionId, GlobalRegionId>,
    next_global_id: GlobalRegionId,
}

/// Hierarchical pathfinder state for every passability class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchicalPathfinder {
    width: u16,
    height: u16,
    chunks_w: u16,
    chunks_h: u16,
    classes: BTreeMap<PassClassMask, ClassRegions>,
}

impl HierarchicalPathfinder {
    /// Empty pathfinder; call [`Self::recompute`] before querying.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every class from scratch.
    pub fn recompute(&mut self, grid: &NavcellGrid, classes: &PassabilityClasses) {
        let masks: Vec<PassClassMask> = classes.iter().map(|c| c.mask).collect();
        self.recompute_masks(grid, &masks);
    }

    pub(crate) fn recompute_masks(&mut self, grid: &NavcellGrid, masks: &[PassClassMask]) {
        self.width = grid.width();
        self.height = grid.height();
        self.chunks_w = grid.width().div_ceil(CHUNK_SIZE);
        self.chunks_h = grid.height().div_ceil(CHUNK_SIZE);
        self.classes.clear();

        for &mask in masks {
            let mut data = ClassRegions::default();
            for cj in 0..self.chunks_h {
                for ci in 0..self.chunks_w {
                    data.chunks.push(Chunk::compute(grid, mask, ci, cj));
                }
            }
            for cj in 0..self.chunks_h {
                for ci in 0..self.chunks_w {
                    self.connect_forward(&mut data, ci, cj);
                }
            }
            flood_global_regions(&mut data);
            self.classes.insert(mask, data);
        }

        tracing::debug!(
            width = self.width,
            height = self.height,
            classes = self.classes.len(),
            "Hierarchical pathfinder recomputed"
        );
    }

    /// Incrementally refresh the chunks touched by `dirtiness`.
    pub fn update(&mut self, grid: &NavcellGrid, dirtiness: &GridDirtiness) {
        if !dirtiness.dirty {
            return;
        }
        if dirtiness.global_recompute || grid.width() != self.width || grid.height() != self.height {
            let masks: Vec<PassClassMask> = self.classes.keys().copied().collect();
            self.recompute_masks(grid, &masks);
            return;
        }

        let mut dirty_chunks = BTreeSet::new();
        let cells = &dirtiness.dirty_cells;
        for j in 0..cells.height() {
            for i in 0..cells.width() {
                if cells.get(i, j) != 0 {
                    dirty_chunks.insert((i / CHUNK_SIZE, j / CHUNK_SIZE));
                }
            }
        }
        if dirty_chunks.is_empty() {
            return;
        }

        let masks: Vec<PassClassMask> = self.classes.keys().copied().collect();
        for mask in masks {
            let Some(mut data) = self.classes.remove(&mask) else {
                continue;
            };

            // Unlink the old regions and forget every global id they touched.
            let mut lost = BTreeSet::new();
            for &(ci, cj) in &dirty_chunks {
                let index = self.chunk_index(ci, cj);
                let old: Vec<RegionId> = data.chunks[index].region_ids().collect();
                for id in old {
                    if let Some(global) = data.global.remove(&id) {
                        lost.insert(global);
                    }
                    if let Some(neighbours) = data.edges.remove(&id) {
                        for n in neighbours {
                            if let Some(set) = data.edges.get_mut(&n) {
                                set.remove(&id);
                            }
                        }
                    }
                }
            }
            data.global.retain(|_, global| !lost.contains(global));

            for &(ci, cj) in &dirty_chunks {
                let index = self.chunk_index(ci, cj);
                data.chunks[index] = Chunk::compute(grid, mask, ci, cj);
            }
            for &(ci, cj) in &dirty_chunks {
                self.connect_all(&mut data, ci, cj);
            }
            flood_global_regions(&mut data);
            self.classes.insert(mask, data);
        }

        tracing::debug!(chunks = dirty_chunks.len(), "Hierarchical pathfinder updated");
    }

    fn chunk_index(&self, ci: u16, cj: u16) -> usize {
        usize::from(cj) * usize::from(self.chunks_w) + usize::from(ci)
    }

    fn chunk(&self, data: &ClassRegions, i: u16, j: u16) -> Option<usize> {
        if i >= self.width || j >= self.height {
            return None;
        }
        let index = self.chunk_index(i / CHUNK_SIZE, j / CHUNK_SIZE);
        (index < data.chunks.len()).then_some(index)
    }

    /// Link chunk `(ci, cj)` with its right and upper neighbours.
    fn connect_forward(&self, data: &mut ClassRegions, ci: u16, cj: u16) {
        if ci + 1 < self.chunks_w {
            self.link(data, (ci, cj), (ci + 1, cj));
        }
        if cj + 1 < self.chunks_h {
            self.link(data, (ci, cj), (ci, cj + 1));
        }
    }

    /// Link chunk `(ci, cj)` with all four neighbours.
    fn connect_all(&self, data: &mut ClassRegions, ci: u16, cj: u16) {
        self.connect_forward(data, ci, cj);
        if ci > 0 {
            self.link(data, (ci - 1, cj), (ci, cj));
        }
        if cj > 0 {
            self.link(data, (ci, cj - 1), (ci, cj));
        }
    }

    /// Add edges between `a` and the chunk `b` directly right of or above it.
    fn link(&self, data: &mut ClassRegions, a: (u16, u16), b: (u16, u16)) {
        let chunk_a = &data.chunks[self.chunk_index(a.0, a.1)];
        let chunk_b = &data.chunks[self.chunk_index(b.0, b.1)];
        let last = CHUNK_SIZE - 1;
        let horizontal = b.0 > a.0;

        let mut found = Vec::new();
        for k in 0..CHUNK_SIZE {
            let (ra, rb) = if horizontal {
                (chunk_a.local_region(last, k), chunk_b.local_region(0, k))
            } else {
                (chunk_a.local_region(k, last), chunk_b.local_region(k, 0))
            };
            if ra != 0 && rb != 0 {
                found.push((
                    RegionId { ci: a.0, cj: a.1, r: ra },
                    RegionId { ci: b.0, cj: b.1, r: rb },
                ));
            }
        }
        for (x, y) in found {
            data.edges.entry(x).or_default().insert(y);
            data.edges.entry(y).or_default().insert(x);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Region containing a navcell, `None` if impassable or unknown.
    #[must_use]
    pub fn get_region(&self, i: u16, j: u16, mask: PassClassMask) -> Option<RegionId> {
        let data = self.classes.get(&mask)?;
        let chunk = &data.chunks[self.chunk(data, i, j)?];
        let r = chunk.region_at(i, j);
        (r != 0).then_some(RegionId {
            ci: chunk.ci(),
            cj: chunk.cj(),
            r,
        })
    }

    /// Global region of a navcell (0 for impassable navcells).
    #[must_use]
    pub fn global_region(&self, i: u16, j: u16, mask: PassClassMask) -> GlobalRegionId {
        self.get_region(i, j, mask)
            .and_then(|id| self.classes.get(&mask)?.global.get(&id).copied())
            .unwrap_or(0)
    }

    /// Regions reachable from a navcell, found by walking region edges.
    #[must_use]
    pub fn find_reachable_regions(&self, i: u16, j: u16, mask: PassClassMask) -> BTreeSet<RegionId> {
        let mut reachable = BTreeSet::new();
        let (Some(start), Some(data)) = (self.get_region(i, j, mask), self.classes.get(&mask)) else {
            return reachable;
        };
        let mut queue = VecDeque::from([start]);
        reachable.insert(start);
        while let Some(id) = queue.pop_front() {
            for &n in data.edges.get(&id).into_iter().flatten() {
                if reachable.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        reachable
    }

    fn chunk_of(&self, id: RegionId) -> usize {
        self.chunk_index(id.ci, id.cj)
    }

    /// Whether any navcell of the goal is reachable from `(i0, j0)`.
    #[must_use]
    pub fn is_goal_reachable(&self, i0: u16, j0: u16, goal: &PathGoal, mask: PassClassMask) -> bool {
        let Some(data) = self.classes.get(&mask) else {
            return false;
        };
        let global = self.global_region(i0, j0, mask);
        if global == 0 {
            return false;
        }
        regions_with_global(data, global).into_iter().any(|id| {
            let chunk = &data.chunks[self.chunk_of(id)];
            let b = chunk.bounds(id.r);
            goal.rect_contains_goal(b.i0, b.j0, b.i1, b.j1)
                && chunk.cells(id.r).any(|(i, j)| goal.navcell_contains_goal(i, j))
        })
    }

    /// Turn `goal` into a point goal guaranteed to be reachable from
    /// `(i0, j0)`.
    ///
    /// Among the reachable navcells overlapping the goal, the one nearest to
    /// the origin wins, preferring navcells whose center is inside the goal.
    /// If no reachable navcell overlaps the goal, the reachable navcell
    /// nearest to the goal center is used instead. Returns the new goal and
    /// whether the original goal was reachable.
    #[must_use]
    pub fn make_goal_reachable(
        &self,
        i0: u16,
        j0: u16,
        goal: &PathGoal,
        mask: PassClassMask,
    ) -> (PathGoal, bool) {
        let Some(data) = self.classes.get(&mask) else {
            return (*goal, false);
        };

        let (oi, oj) = match self.global_region(i0, j0, mask) {
            0 => match self.find_nearest_passable_navcell(i0, j0, mask) {
                Some(cell) => cell,
                None => return (*goal, false),
            },
            _ => (i0, j0),
        };
        let global = self.global_region(oi, oj, mask);

        if goal.kind == GoalType::Point {
            let (gi, gj) = nearest_navcell(goal.center.x, goal.center.y, self.width, self.height);
            if self.global_region(gi, gj, mask) == global {
                return (*goal, true);
            }
        }

        let reachable = self.find_reachable_regions(oi, oj, mask);

        // (center outside goal, distance to origin, row, column)
        let mut best: Option<(bool, u32, u16, u16)> = None;
        for (bound, id) in self.by_bound_distance(data, reachable.iter().copied(), oi, oj) {
            // A navcell centered in the goal beats every other kind.
            if best.is_some_and(|(outside, d, _, _)| !outside && bound > d) {
                break;
            }
            let chunk = &data.chunks[self.chunk_of(id)];
            let b = chunk.bounds(id.r);
            if !goal.rect_contains_goal(b.i0, b.j0, b.i1, b.j1) {
                continue;
            }
            for (i, j) in chunk.cells(id.r) {
                if !goal.navcell_contains_goal(i, j) {
                    continue;
                }
                let di = u32::from(i.abs_diff(oi));
                let dj = u32::from(j.abs_diff(oj));
                let key = (!goal.navcell_center_in_goal(i, j), di * di + dj * dj, j, i);
                if best.map_or(true, |current| key < current) {
                    best = Some(key);
                }
            }
        }

        if let Some((outside, _, j, i)) = best {
            let center = navcell_center(i, j);
            let point = if outside {
                goal.nearest_point_on_goal(center)
            } else {
                center
            };
            return (PathGoal::point(point).with_max_dist(goal.max_dist), true);
        }

        // Unreachable: nearest reachable navcell to the goal center.
        let (gi, gj) = nearest_navcell(goal.center.x, goal.center.y, self.width, self.height);
        let candidates = self.by_bound_distance(data, reachable, gi, gj);
        let point = self
            .nearest_cell(data, &candidates, gi, gj)
            .map_or(navcell_center(oi, oj), |(i, j)| navcell_center(i, j));
        (PathGoal::point(point).with_max_dist(goal.max_dist), false)
    }

    /// Nearest passable navcell to `(i, j)` by Euclidean distance, ties
    /// broken by row then column.
    #[must_use]
    pub fn find_nearest_passable_navcell(&self, i: u16, j: u16, mask: PassClassMask) -> Option<(u16, u16)> {
        let data = self.classes.get(&mask)?;
        if self.get_region(i, j, mask).is_some() {
            return Some((i, j));
        }
        let all = data.chunks.iter().flat_map(Chunk::region_ids);
        let candidates = self.by_bound_distance(data, all, i, j);
        self.nearest_cell(data, &candidates, i, j)
    }

    /// Pair regions with the squared distance from `(i, j)` to their bounds,
    /// nearest first.
    fn by_bound_distance(
        &self,
        data: &ClassRegions,
        regions: impl IntoIterator<Item = RegionId>,
        i: u16,
        j: u16,
    ) -> Vec<(u32, RegionId)> {
        let mut out: Vec<(u32, RegionId)> = regions
            .into_iter()
            .map(|id| (data.chunks[self.chunk_of(id)].bounds(id.r).distance_squared(i, j), id))
            .collect();
        out.sort_unstable();
        out
    }

    /// Nearest navcell to `(i, j)` among `candidates` (sorted by bound
    /// distance). Regions never span chunks, so each scan is bounded by the
    /// chunk size and stops at the first region whose bounds are too far.
    fn nearest_cell(&self, data: &ClassRegions, candidates: &[(u32, RegionId)], i: u16, j: u16) -> Option<(u16, u16)> {
        let mut best: Option<(u32, u16, u16)> = None;
        for &(bound, id) in candidates {
            if best.is_some_and(|(d, _, _)| bound > d) {
                break;
            }
            for (x, y) in data.chunks[self.chunk_of(id)].cells(id.r) {
                let di = u32::from(x.abs_diff(i));
                let dj = u32::from(y.abs_diff(j));
                let key = (di * di + dj * dj, y, x);
                if best.map_or(true, |current| key < current) {
                    best = Some(key);
                }
            }
        }
        best.map(|(_, y, x)| (x, y))
    }

    /// Number of region-adjacency entries for a class (each edge is counted
    /// once per direction).
    #[must_use]
    pub fn edge_count(&self, mask: PassClassMask) -> usize {
        self.classes
            .get(&mask)
            .map_or(0, |data| data.edges.values().map(BTreeSet::len).sum())
    }

    /// Number of regions over all chunks for a class.
    #[must_use]
    pub fn region_count(&self, mask: PassClassMask) -> usize {
        self.classes.get(&mask).map_or(0, |data| {
            data.chunks.iter().map(|c| usize::from(c.region_count())).sum()
        })
    }

    /// Number of distinct global regions for a class.
    #[must_use]
    pub fn global_region_count(&self, mask: PassClassMask) -> usize {
        self.classes.get(&mask).map_or(0, |data| {
            data.global.values().collect::<BTreeSet<_>>().len()
        })
    }

    /// Global region id of every navcell, for external visualisation.
    #[must_use]
    pub fn global_region_grid(&self, mask: PassClassMask) -> Grid<GlobalRegionId> {
        let mut out = Grid::new(self.width, self.height);
        for j in 0..self.height {
            for i in 0..self.width {
                out.set(i, j, self.global_region(i, j, mask));
            }
        }
        out
    }
}

/// Regions sharing a global id, in ascending order.
fn regions_with_global(data: &ClassRegions, global: GlobalRegionId) -> Vec<RegionId> {
    data.global
        .iter()
        .filter(|&(_, &g)| g == global)
        .map(|(&id, _)| id)
        .collect()
}

/// Give every region without a global id a fresh one, spreading it over
/// the region-adjacency graph.
fn flood_global_regions(data: &mut ClassRegions) {
    let all: Vec<RegionId> = data.chunks.iter().flat_map(Chunk::region_ids).collect();
    for start in all {
        if data.global.contains_key(&start) {
            continue;
        }
        data.next_global_id += 1;
        let id = data.next_global_id;
        data.global.insert(start, id);
        let mut queue = VecDeque::from([start]);
        while let Some(region) = queue.pop_front() {
            for &n in data.edges.get(&region).into_iter().flatten() {
                if let std::collections::btree_map::Entry::Vacant(entry) = data.global.entry(n) {
                    entry.insert(id);
                    queue.push_back(n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::passability::PassabilityConfig;
    use proptest::prelude::*;

    const CLASS: PassClassMask = 1;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    /// Open grid with an impassable outer ring.
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

    fn pathfinder(grid: &NavcellGrid) -> HierarchicalPathfinder {
        let mut hier = HierarchicalPathfinder::new();
        hier.recompute_masks(grid, &[CLASS]);
        hier
    }

    /// Label every passable cell by exhaustive 4-connected flood fill.
    fn flood_labels(grid: &NavcellGrid) -> Grid<u32> {
        let mut labels: Grid<u32> = Grid::new(grid.width(), grid.height());
        let mut next = 0;
        for j in 0..grid.height() {
            for i in 0..grid.width() {
                if labels.get(i, j) != 0 || !grid.is_passable_at(i32::from(i), i32::from(j), CLASS) {
                    continue;
                }
                next += 1;
                labels.set(i, j, next);
                let mut queue = VecDeque::from([(i, j)]);
                while let Some((x, y)) = queue.pop_front() {
                    for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                        let (nx, ny) = (i32::from(x) + dx, i32::from(y) + dy);
                        if grid.is_passable_at(nx, ny, CLASS) && labels.get(nx as u16, ny as u16) == 0 {
                            labels.set(nx as u16, ny as u16, next);
                            queue.push_back((nx as u16, ny as u16));
                        }
                    }
                }
            }
        }
        labels
    }

    fn assert_matches_flood_fill(grid: &NavcellGrid, hier: &HierarchicalPathfinder) {
        let labels = flood_labels(grid);
        let mut mapping: BTreeMap<u32, GlobalRegionId> = BTreeMap::new();
        let mut reverse: BTreeMap<GlobalRegionId, u32> = BTreeMap::new();
        for j in 0..grid.height() {
            for i in 0..grid.width() {
                let label = labels.get(i, j);
                let global = hier.global_region(i, j, CLASS);
                assert_eq!(label == 0, global == 0, "passability mismatch at ({i},{j})");
                if label == 0 {
                    continue;
                }
                assert_eq!(*mapping.entry(label).or_insert(global), global, "split component at ({i},{j})");
                assert_eq!(*reverse.entry(global).or_insert(label), label, "merged components at ({i},{j})");
            }
        }
    }

    #[test]
    fn test_wall_makes_two_global_regions() {
        let mut grid = bordered_grid(240, 240);
        for j in 0..240 {
            grid.set(125, j, CLASS);
        }
        let hier = pathfinder(&grid);
        assert_eq!(hier.global_region_count(CLASS), 2);

        let left = hier.global_region(10, 10, CLASS);
        let right = hier.global_region(200, 10, CLASS);
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);

        // Every chunk on each side shares its side's id.
        for cj in 0..3u16 {
            for ci in 0..3u16 {
                let (i, j) = (ci * 96 + 20, cj * 96 + 20);
                let expected = if i < 125 { left } else { right };
                assert_eq!(hier.global_region(i, j, CLASS), expected);
            }
        }
        assert_eq!(hier.global_region(125, 50, CLASS), 0);
        assert_matches_flood_fill(&grid, &hier);
    }

    #[test]
    fn test_update_split_then_unsplit_restores_counts() {
        let grid = bordered_grid(200, 200);
        let mut hier = pathfinder(&grid);
        let edges = hier.edge_count(CLASS);
        let regions = hier.region_count(CLASS);

        let mut split = grid.clone();
        let mut dirtiness = GridDirtiness::new(200, 200);
        for j in 0..200 {
            split.set(100, j, CLASS);
            dirtiness.mark(100, j);
        }
        hier.update(&split, &dirtiness);
        let fresh = pathfinder(&split);
        assert_eq!(hier.edge_count(CLASS), fresh.edge_count(CLASS));
        assert_eq!(hier.region_count(CLASS), fresh.region_count(CLASS));
        assert_eq!(hier.global_region_count(CLASS), 2);
        assert_matches_flood_fill(&split, &hier);

        hier.update(&grid, &dirtiness);
        assert_eq!(hier.edge_count(CLASS), edges);
        assert_eq!(hier.region_count(CLASS), regions);
        assert_eq!(hier.global_region_count(CLASS), 1);
        assert_matches_flood_fill(&grid, &hier);
    }

    #[test]
    fn test_goal_reachability() {
        let mut grid = bordered_grid(120, 120);
        // Walled-in box around (80, 80).
        for k in 70..=90 {
            grid.set(k, 70, CLASS);
            grid.set(k, 90, CLASS);
            grid.set(70, k, CLASS);
            grid.set(90, k, CLASS);
        }
        let hier = pathfinder(&grid);

        let inside = PathGoal::point(vec2(80, 80));
        assert!(!hier.is_goal_reachable(10, 10, &inside, CLASS));
        let outside = PathGoal::circle(vec2(40, 40), fixed(3), false);
        assert!(hier.is_goal_reachable(10, 10, &outside, CLASS));

        let (snapped, reachable) = hier.make_goal_reachable(10, 10, &outside, CLASS);
        assert!(reachable);
        assert!(outside.contains_point(snapped.center));

        let (snapped, reachable) = hier.make_goal_reachable(10, 10, &inside, CLASS);
        assert!(!reachable);
        // Nearest reachable navcell to (80, 80) is just outside the box wall.
        let (si, sj) = nearest_navcell(snapped.center.x, snapped.center.y, 120, 120);
        assert_eq!(hier.global_region(si, sj, CLASS), hier.global_region(10, 10, CLASS));
        assert!(si == 69 || si == 91 || sj == 69 || sj == 91);
    }

    #[test]
    fn test_reachable_point_goal_is_unchanged() {
        let grid = bordered_grid(100, 100);
        let hier = pathfinder(&grid);
        let goal = PathGoal::point(Vec2Fixed::new(Fixed::from_num(50.25), Fixed::from_num(60.5)));
        let (snapped, reachable) = hier.make_goal_reachable(5, 5, &goal, CLASS);
        assert!(reachable);
        assert_eq!(snapped, goal);
    }

    #[test]
    fn test_nearest_passable_navcell() {
        let mut grid = bordered_grid(50, 50);
        for j in 10..20 {
            for i in 10..20 {
                grid.set(i, j, CLASS);
            }
        }
        let hier = pathfinder(&grid);
        assert_eq!(hier.find_nearest_passable_navcell(12, 15, CLASS), Some((9, 15)));
        assert_eq!(hier.find_nearest_passable_navcell(30, 30, CLASS), Some((30, 30)));
        assert_eq!(hier.find_nearest_passable_navcell(0, 0, CLASS), Some((1, 1)));
    }

    /// Nearest passable navcell by scanning every navcell.
    fn brute_nearest(grid: &NavcellGrid, i: u16, j: u16) -> Option<(u16, u16)> {
        let mut best: Option<(u32, u16, u16)> = None;
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                if !grid.is_passable_at(i32::from(x), i32::from(y), CLASS) {
                    continue;
                }
                let di = u32::from(x.abs_diff(i));
                let dj = u32::from(y.abs_diff(j));
                let key = (di * di + dj * dj, y, x);
                if best.map_or(true, |current| key < current) {
                    best = Some(key);
                }
            }
        }
        best.map(|(_, y, x)| (x, y))
    }

    #[test]
    fn test_nearest_passable_navcell_chunks_away() {
        // Fully blocked except a small pocket two chunks from the origin.
        let mut grid: NavcellGrid = Grid::new(300, 300);
        for j in 0..300 {
            for i in 0..300 {
                grid.set(i, j, CLASS);
            }
        }
        for j in 250..253 {
            for i in 260..262 {
                grid.set(i, j, 0);
            }
        }
        let hier = pathfinder(&grid);
        assert_eq!(hier.find_nearest_passable_navcell(10, 10, CLASS), Some((260, 250)));
        assert_eq!(hier.find_nearest_passable_navcell(299, 299, CLASS), Some((261, 252)));

        // From inside the pocket, a far goal snaps to the pocket corner nearest to it.
        let (snapped, reachable) = hier.make_goal_reachable(261, 251, &PathGoal::point(vec2(10, 10)), CLASS);
        assert!(!reachable);
        assert_eq!(snapped.center, navcell_center(260, 250));
    }

    #[test]
    fn test_more_than_255_chunks_per_row() {
        let width = 257 * CHUNK_SIZE;
        let grid: NavcellGrid = Grid::new(width, 4);
        let hier = pathfinder(&grid);
        assert_eq!(hier.region_count(CLASS), 257);
        assert_eq!(hier.global_region_count(CLASS), 1);
        let far = hier.get_region(width - 1, 3, CLASS).expect("passable");
        assert_eq!(far.ci, 256);
        assert_eq!(hier.global_region(width - 1, 3, CLASS), hier.global_region(0, 0, CLASS));
    }

    #[test]
    fn test_reachable_regions_follow_edges() {
        let grid = bordered_grid(200, 100);
        let hier = pathfinder(&grid);
        let regions = hier.find_reachable_regions(5, 5, CLASS);
        assert_eq!(regions.len(), hier.region_count(CLASS));
    }

    #[test]
    fn test_recompute_from_classes() {
        let classes = PassabilityClasses::from_config(&PassabilityConfig::default());
        let grid: NavcellGrid = Grid::new(100, 100);
        let mut hier = HierarchicalPathfinder::new();
        hier.recompute(&grid, &classes);
        for class in classes.iter() {
            assert_eq!(hier.global_region_count(class.mask), 1);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        /// Global region ids agree with an exhaustive flood fill, both after
        /// a full recompute and after incrementally adding walls.
        #[test]
        fn prop_regions_match_flood_fill(
            walls in proptest::collection::vec((1u16..199, 1u16..149, 1u16..40, 1u16..4, any::<bool>()), 1..12),
        ) {
            let mut grid = bordered_grid(200, 150);
            let mut hier = pathfinder(&grid);
            let mut dirtiness = GridDirtiness::new(200, 150);
            for (x, y, len, thickness, vertical) in walls {
                for a in 0..len {
                    for b in 0..thickness {
                        let (i, j) = if vertical { (x + b, y + a) } else { (x + a, y + b) };
                        if i < 200 && j < 150 {
                            grid.set(i, j, CLASS);
                            dirtiness.mark(i, j);
                        }
                    }
                }
            }
            hier.update(&grid, &dirtiness);
            assert_matches_flood_fill(&grid, &hier);
            assert_matches_flood_fill(&grid, &pathfinder(&grid));
        }

        /// The region-ordered nearest-navcell search agrees with a full scan.
        #[test]
        fn prop_nearest_passable_matches_full_scan(
            blocks in proptest::collection::vec((0u16..200, 0u16..150, 1u16..60, 1u16..60), 1..10),
            query in (0u16..200, 0u16..150),
        ) {
            let mut grid: NavcellGrid = Grid::new(200, 150);
            for (x, y, w, h) in blocks {
                for j in y..(y + h).min(150) {
                    for i in x..(x + w).min(200) {
                        grid.set(i, j, CLASS);
                    }
                }
            }
            let hier = pathfinder(&grid);
            prop_assert_eq!(
                hier.find_nearest_passable_navcell(query.0, query.1, CLASS),
                brute_nearest(&grid, query.0, query.1)
            );
        }
    }
}
