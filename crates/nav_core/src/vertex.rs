//! Short-range pathfinding: A* over a visibility graph.
//!
//! The graph is built per request inside a square search box around the
//! origin. Vertices are the clearance-expanded corners of nearby
//! obstructions (units count as axis-aligned squares) and the convex
//! corners of impassable terrain. The goal is a single vertex that moves to
//! the nearest goal point each time it is looked at from a new vertex.
//! Edges are one-sided, so a unit that starts inside a shape can leave it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::geometry::{point_is_in_square, test_ray_square};
use crate::grid::{check_line_movement, NavcellGrid, PassClassMask, NAVCELL_SIZE};
use crate::math::{Fixed, Vec2Fixed};
use crate::obstruction::{ObstructionFilter, ObstructionManager};
use crate::path::{ShortPathRequest, WaypointPath};

/// Distance by which vertices sit outside the shape they belong to.
pub const EDGE_EXPAND_DELTA: Fixed = Fixed::from_bits(1 << 28);

const START: usize = 0;
const GOAL: usize = 1;

/// An expanded obstruction that edges may not enter.
#[derive(Debug, Clone, Copy)]
struct Blocker {
    center: Vec2Fixed,
    u: Vec2Fixed,
    v: Vec2Fixed,
    half: Vec2Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unexplored,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    pos: Vec2Fixed,
    /// Directions of the two boundary edges leaving the corner.
    sides: Option<(Vec2Fixed, Vec2Fixed)>,
    g: Fixed,
    h: Fixed,
    parent: Option<usize>,
    status: Status,
}

impl Vertex {
    fn new(pos: Vec2Fixed, sides: Option<(Vec2Fixed, Vec2Fixed)>) -> Self {
        Self {
            pos,
            sides,
            g: Fixed::MAX,
            h: Fixed::ZERO,
            parent: None,
            status: Status::Unexplored,
        }
    }

    /// Whether leaving (or arriving) along `d` keeps the corner's shape on
    /// one side. Edges between the two boundary directions, or between
    /// their opposites, cannot be part of a locally shortest path.
    fn is_tangent(&self, d: Vec2Fixed) -> bool {
        let Some((e1, e2)) = self.sides else {
            return true;
        };
        let c1 = d.cross(e1);
        let c2 = d.cross(e2);
        !((c1 > Fixed::ZERO && c2 < Fixed::ZERO) || (c1 < Fixed::ZERO && c2 > Fixed::ZERO))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueItem {
    index: usize,
    f: Fixed,
    h: Fixed,
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Axis-aligned search box.
#[derive(Debug, Clone, Copy)]
struct SearchBox {
    min: Vec2Fixed,
    max: Vec2Fixed,
}

impl SearchBox {
    fn contains(&self, p: Vec2Fixed) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    fn clamp(&self, p: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(p.x.clamp(self.min.x, self.max.x), p.y.clamp(self.min.y, self.max.y))
    }
}

struct Graph<'a> {
    blockers: Vec<Blocker>,
    vertices: Vec<Vertex>,
    terrain: &'a NavcellGrid,
    mask: PassClassMask,
}

impl Graph<'_> {
    fn inside_blocker(&self, p: Vec2Fixed) -> bool {
        self.blockers
            .iter()
            .any(|b| point_is_in_square(p - b.center, b.u, b.v, b.half))
    }

    fn visible(&self, a: Vec2Fixed, b: Vec2Fixed) -> bool {
        self.blockers
            .iter()
            .all(|s| !test_ray_square(a - s.center, b - s.center, s.u, s.v, s.half))
            && check_line_movement(a, b, self.mask, self.terrain)
    }

    fn terrain_passable_at(&self, p: Vec2Fixed) -> bool {
        let i = (p.x / NAVCELL_SIZE).floor().to_num::<i32>();
        let j = (p.y / NAVCELL_SIZE).floor().to_num::<i32>();
        self.terrain.is_passable_at(i, j, self.mask)
    }

    fn add_corner(&mut self, bounds: &SearchBox, pos: Vec2Fixed, sides: (Vec2Fixed, Vec2Fixed)) {
        if bounds.contains(pos) && !self.inside_blocker(pos) && self.terrain_passable_at(pos) {
            self.vertices.push(Vertex::new(pos, Some(sides)));
        }
    }

    fn add_obstruction_corners(&mut self, bounds: &SearchBox) {
        let delta = Vec2Fixed::new(EDGE_EXPAND_DELTA, EDGE_EXPAND_DELTA);
        for k in 0..self.blockers.len() {
            let b = self.blockers[k];
            let half = b.half + delta;
            for (su, sv) in [(-1, -1), (1, -1), (1, 1), (-1, 1)] {
                let (su, sv) = (Fixed::from_num(su), Fixed::from_num(sv));
                let pos = b.center + b.u.scale(half.x * su) + b.v.scale(half.y * sv);
                self.add_corner(bounds, pos, (-b.u.scale(su), -b.v.scale(sv)));
            }
        }
    }

    fn add_terrain_corners(&mut self, bounds: &SearchBox) {
        let cell = |v: Fixed| (v / NAVCELL_SIZE).floor().to_num::<i32>();
        let (i0, j0) = (cell(bounds.min.x), cell(bounds.min.y));
        let (i1, j1) = (cell(bounds.max.x), cell(bounds.max.y));
        let open = |i: i32, j: i32| self.terrain.is_passable_at(i, j, self.mask);
        let half = NAVCELL_SIZE / 2;

        let mut corners = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                if open(i, j) || !self.terrain.in_bounds(i, j) {
                    continue;
                }
                for (si, sj) in [(-1, -1), (1, -1), (1, 1), (-1, 1)] {
                    if !(open(i + si, j) && open(i, j + sj) && open(i + si, j + sj)) {
                        continue;
                    }
                    let dir = Vec2Fixed::from_ints(si, sj);
                    let cell_center = Vec2Fixed::new(
                        Fixed::from_num(i) * NAVCELL_SIZE + half,
                        Fixed::from_num(j) * NAVCELL_SIZE + half,
                    );
                    let pos = cell_center + dir.scale(half + EDGE_EXPAND_DELTA);
                    corners.push((pos, (Vec2Fixed::from_ints(-si, 0), Vec2Fixed::from_ints(0, -sj))));
                }
            }
        }
        for (pos, sides) in corners {
            self.add_corner(bounds, pos, sides);
        }
    }
}

/// Compute a short path for `request`, avoiding the obstructions that pass
/// its movement filter and the impassable cells of `terrain`.
///
/// Returns the waypoints after the origin. If the goal cannot be reached
/// inside the search box, the path leads to the explored vertex nearest to
/// the goal, which may be an empty path.
#[must_use]
pub fn compute_short_path(
    request: &ShortPathRequest,
    obstructions: &ObstructionManager,
    terrain: &NavcellGrid,
) -> WaypointPath {
    let start = request.start;
    let goal = &request.goal;
    if goal.contains_point(start) {
        return WaypointPath::new();
    }

    let range = request.range.max(NAVCELL_SIZE);
    let reach = Vec2Fixed::new(range, range);
    let bounds = SearchBox {
        min: start - reach,
        max: start + reach,
    };

    let filter = ObstructionFilter::ControlGroupMovement {
        avoid_moving: request.avoid_moving_units,
        group: request.group,
    };
    let grow = Vec2Fixed::new(request.clearance, request.clearance);
    let blockers = obstructions
        .get_obstructions_in_range(&filter, bounds.min - grow, bounds.max + grow)
        .into_iter()
        .map(|square| Blocker {
            center: square.center,
            u: square.u,
            v: square.v,
            half: square.half() + grow,
        })
        .collect();

    let mut graph = Graph {
        blockers,
        vertices: vec![Vertex::new(start, None), Vertex::new(start, None)],
        terrain,
        mask: request.pass_class,
    };
    graph.add_obstruction_corners(&bounds);
    graph.add_terrain_corners(&bounds);

    let mut open = BinaryHeap::new();
    let start_h = goal.distance_to_point(start);
    graph.vertices[START].g = Fixed::ZERO;
    graph.vertices[START].h = start_h;
    graph.vertices[START].status = Status::Open;
    open.push(QueueItem {
        index: START,
        f: start_h,
        h: start_h,
    });

    let mut best = START;
    let mut reached = false;

    while let Some(item) = open.pop() {
        let current = graph.vertices[item.index];
        if current.status == Status::Closed {
            continue;
        }
        graph.vertices[item.index].status = Status::Closed;

        if item.index == GOAL {
            reached = true;
            break;
        }
        if current.h < graph.vertices[best].h {
            best = item.index;
        }

        let goal_pos = bounds.clamp(goal.nearest_point_on_goal(current.pos));

        for n in 1..graph.vertices.len() {
            let neighbour = graph.vertices[n];
            if neighbour.status == Status::Closed {
                continue;
            }
            let npos = if n == GOAL { goal_pos } else { neighbour.pos };
            let d = npos - current.pos;
            if !current.is_tangent(d) || !neighbour.is_tangent(-d) {
                continue;
            }
            let g = current.g + current.pos.distance(npos);
            if g >= neighbour.g || !graph.visible(current.pos, npos) {
                continue;
            }
            let h = if n == GOAL {
                Fixed::ZERO
            } else {
                goal.distance_to_point(npos)
            };
            let vertex = &mut graph.vertices[n];
            vertex.pos = npos;
            vertex.g = g;
            vertex.h = h;
            vertex.parent = Some(item.index);
            vertex.status = Status::Open;
            open.push(QueueItem { index: n, f: g + h, h });
        }
    }

    let end = if reached { GOAL } else { best };
    let mut points = Vec::new();
    let mut cursor = end;
    while cursor != START {
        points.push(graph.vertices[cursor].pos);
        match graph.vertices[cursor].parent {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    trace!(
        vertices = graph.vertices.len(),
        blockers = graph.blockers.len(),
        reached,
        waypoints = points.len(),
        "short path computed"
    );
    WaypointPath::from_end_first(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{EntityId, INVALID_ENTITY};
    use crate::goal::PathGoal;
    use crate::grid::Grid;
    use crate::obstruction::ObstructionFlags;

    const CLASS: PassClassMask = 1;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    const BLOCKING: ObstructionFlags =
        ObstructionFlags(ObstructionFlags::BLOCK_MOVEMENT.0 | ObstructionFlags::BLOCK_PATHFINDING.0);

    fn request(start: Vec2Fixed, goal: PathGoal, range: i32) -> ShortPathRequest {
        ShortPathRequest {
            ticket: 1,
            start,
            clearance: Fixed::ONE,
            range: fixed(range),
            goal,
            pass_class: CLASS,
            avoid_moving_units: false,
            group: 99,
            notify: 99,
        }
    }

    fn open_terrain() -> NavcellGrid {
        Grid::new(64, 64)
    }

    fn add_wall(m: &mut ObstructionManager, entity: EntityId, at: Vec2Fixed, w: i32, h: i32) {
        m.add_static_shape(entity, at, Fixed::ZERO, fixed(w), fixed(h), BLOCKING, entity, INVALID_ENTITY);
    }

    /// Every leg is collision-free against the expanded obstructions.
    fn legs_clear(req: &ShortPathRequest, m: &ObstructionManager, path: &WaypointPath) -> bool {
        let filter = ObstructionFilter::ControlGroupMovement {
            avoid_moving: req.avoid_moving_units,
            group: req.group,
        };
        let mut prev = req.start;
        path.walk_order().all(|p| {
            let ok = !m.test_line(&filter, prev, p, req.clearance);
            prev = p;
            ok
        })
    }

    #[test]
    fn test_open_field_goes_straight() {
        let m = ObstructionManager::new(64, 64);
        let req = request(vec2(10, 10), PathGoal::point(vec2(20, 14)), 16);
        let path = compute_short_path(&req, &m, &open_terrain());
        assert_eq!(path.walk_order().collect::<Vec<_>>(), vec![vec2(20, 14)]);
    }

    #[test]
    fn test_detours_around_building() {
        let mut m = ObstructionManager::new(64, 64);
        add_wall(&mut m, 5, vec2(20, 20), 4, 10);
        let req = request(vec2(14, 20), PathGoal::point(vec2(26, 20)), 16);
        let path = compute_short_path(&req, &m, &open_terrain());
        assert!(path.len() >= 2, "{path:?}");
        assert_eq!(path.last(), Some(vec2(26, 20)));
        assert!(legs_clear(&req, &m, &path));
        // Corners sit just outside the building grown by the clearance.
        let first = path.next().expect("waypoint");
        assert!(first.x < fixed(17));
        assert!((first.y - fixed(20)).abs() > fixed(6));
    }

    #[test]
    fn test_own_control_group_is_ignored() {
        let mut m = ObstructionManager::new(64, 64);
        m.add_static_shape(5, vec2(20, 20), Fixed::ZERO, fixed(4), fixed(10), BLOCKING, 99, INVALID_ENTITY);
        let req = request(vec2(14, 20), PathGoal::point(vec2(26, 20)), 16);
        let path = compute_short_path(&req, &m, &open_terrain());
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_moving_units_only_block_when_avoided() {
        let mut m = ObstructionManager::new(64, 64);
        let tag = m.add_unit_shape(7, vec2(20, 20), fixed(2), BLOCKING, INVALID_ENTITY);
        m.set_unit_moving_flag(tag, true).expect("unit");
        let mut req = request(vec2(14, 20), PathGoal::point(vec2(26, 20)), 16);
        assert_eq!(compute_short_path(&req, &m, &open_terrain()).len(), 1);

        req.avoid_moving_units = true;
        let path = compute_short_path(&req, &m, &open_terrain());
        assert!(path.len() >= 2);
        assert!(legs_clear(&req, &m, &path));
    }

    #[test]
    fn test_goal_outside_box_is_clamped() {
        let m = ObstructionManager::new(128, 128);
        let req = request(vec2(20, 20), PathGoal::point(vec2(60, 20)), 8);
        let path = compute_short_path(&req, &m, &Grid::new(128, 128));
        assert_eq!(path.walk_order().collect::<Vec<_>>(), vec![vec2(28, 20)]);
    }

    #[test]
    fn test_start_inside_shape_can_leave() {
        let mut m = ObstructionManager::new(64, 64);
        add_wall(&mut m, 5, vec2(20, 20), 4, 4);
        let req = request(vec2(20, 20), PathGoal::point(vec2(30, 20)), 16);
        let path = compute_short_path(&req, &m, &open_terrain());
        assert_eq!(path.last(), Some(vec2(30, 20)));
    }

    #[test]
    fn test_terrain_wall_is_avoided() {
        let m = ObstructionManager::new(64, 64);
        let mut terrain = open_terrain();
        for j in 10..30 {
            terrain.set(20, j, CLASS);
        }
        let req = request(vec2(15, 20), PathGoal::point(vec2(25, 20)), 16);
        let path = compute_short_path(&req, &m, &terrain);
        assert_eq!(path.last(), Some(vec2(25, 20)));
        let mut prev = req.start;
        for p in path.walk_order() {
            assert!(check_line_movement(prev, p, CLASS, &terrain));
            prev = p;
        }
        assert!(path.walk_order().any(|p| p.y < fixed(10) || p.y > fixed(30)));
    }

    #[test]
    fn test_enclosed_goal_returns_best_partial_path() {
        let mut m = ObstructionManager::new(64, 64);
        add_wall(&mut m, 1, vec2(30, 24), 10, 2);
        add_wall(&mut m, 2, vec2(30, 36), 10, 2);
        add_wall(&mut m, 3, vec2(24, 30), 2, 14);
        add_wall(&mut m, 4, vec2(36, 30), 2, 14);
        let req = request(vec2(10, 30), PathGoal::point(vec2(30, 30)), 24);
        let path = compute_short_path(&req, &m, &open_terrain());
        let end = path.last().expect("partial path");
        assert_ne!(end, vec2(30, 30));
        assert!(end.distance(vec2(30, 30)) < vec2(10, 30).distance(vec2(30, 30)));
        assert!(legs_clear(&req, &m, &path));
    }
}
