//! Pathfinding orchestrator.
//!
//! Owns the navcell grids and both grid-based pathfinders, and runs the
//! per-turn request pipeline:
//!
//! 1. Requests issued during a turn are queued and get a ticket.
//! 2. [`Pathfinder::update_grid`] applies terrain and obstruction changes.
//! 3. [`Pathfinder::start_processing_moves`] computes up to
//!    `max_same_turn_moves` queued requests on the worker pool, borrowing the
//!    grids and region tables immutably.
//! 4. [`Pathfinder::fetch_async_results`] hands the results back in ticket
//!    order, independent of the number of workers.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::components::{EntityId, INVALID_ENTITY};
use crate::error::{NavError, Result};
use crate::goal::PathGoal;
use crate::grid::{
    check_line_movement, expand_impassable_cells, navcell_center, nearest_navcell, Grid, GridDirtiness,
    NavcellGrid, PassClassMask, NAVCELLS_PER_TILE, NAVCELL_SIZE,
};
use crate::hierarchical::{GlobalRegionId, HierarchicalPathfinder};
use crate::long_range::{LongPathfinder, DEFAULT_MAX_ITERATIONS};
use crate::math::{Fixed, Vec2Fixed};
use crate::obstruction::{
    axes_from_angle, rasterize_circle_with_clearance, rasterize_rect_with_clearance, ObstructionFilter,
    ObstructionManager, Span,
};
use crate::passability::{PassabilityClass, PassabilityClasses, PassabilityConfig};
use crate::path::{LongPathRequest, PathKind, PathResultMessage, PathTicket, ShortPathRequest, WaypointPath};
use crate::terrain::{compute_shore_distances, TerrainSource};
use crate::vertex::compute_short_path;

/// Tunables of the orchestrator.
///
/// # Example RON
///
/// ```ron
/// PathfinderConfig(
///     workers: 4,
///     max_same_turn_moves: 64,
///     use_jump_point_cache: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathfinderConfig {
    /// Worker threads for path requests (0 = rayon default).
    #[serde(default)]
    pub workers: usize,
    /// Requests computed per turn; the rest wait for the next turn.
    #[serde(default = "default_max_same_turn_moves")]
    pub max_same_turn_moves: usize,
    /// Whether the long-range search uses the jump point cache.
    #[serde(default = "default_use_jump_point_cache")]
    pub use_jump_point_cache: bool,
    /// Cap on expanded jump points per long-range search.
    #[serde(default = "default_max_long_path_iterations")]
    pub max_long_path_iterations: u32,
}

fn default_max_same_turn_moves() -> usize {
    64
}

fn default_use_jump_point_cache() -> bool {
    true
}

fn default_max_long_path_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_same_turn_moves: default_max_same_turn_moves(),
            use_jump_point_cache: default_use_jump_point_cache(),
            max_long_path_iterations: default_max_long_path_iterations(),
        }
    }
}

impl PathfinderConfig {
    /// Parse a configuration document. `label` names the source in errors.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|source| NavError::ConfigParse {
            path: label.to_string(),
            source,
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| NavError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&path.display().to_string(), &text)
    }
}

/// Outcome of a placement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FoundationCheck {
    /// The placement is valid.
    Success,
    /// The query itself was invalid (unknown class, off the map).
    FailError,
    /// The placed entity has no obstruction.
    FailNoObstruction,
    /// The footprint overlaps an obstruction.
    FailObstructsFoundation,
    /// The footprint covers terrain the class may not occupy.
    FailTerrainClass,
}

impl FoundationCheck {
    /// Whether the check passed.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Persistent part of the request pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestQueueState {
    /// Long-range requests not yet computed.
    pub long_requests: Vec<LongPathRequest>,
    /// Short-range requests not yet computed.
    pub short_requests: Vec<ShortPathRequest>,
    /// Computed results not yet fetched.
    pub results: Vec<PathResultMessage>,
    /// Ticket the next request will get.
    pub next_ticket: PathTicket,
}

/// A queued path request of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathRequest {
    Long(LongPathRequest),
    Short(ShortPathRequest),
}

impl PathRequest {
    fn ticket(&self) -> PathTicket {
        match self {
            Self::Long(r) => r.ticket,
            Self::Short(r) => r.ticket,
        }
    }
}

/// The pathfinding orchestrator.
#[derive(Debug)]
pub struct Pathfinder {
    config: PathfinderConfig,
    classes: PassabilityClasses,
    terrain_grid: NavcellGrid,
    grid: NavcellGrid,
    dirtiness: GridDirtiness,
    terrain_dirty: bool,
    hierarchical: HierarchicalPathfinder,
    long_range: LongPathfinder,
    long_requests: Vec<LongPathRequest>,
    short_requests: Vec<ShortPathRequest>,
    results: Vec<PathResultMessage>,
    next_ticket: PathTicket,
    pool: Option<rayon::ThreadPool>,
}

impl Pathfinder {
    /// Create an orchestrator with no terrain loaded yet.
    #[must_use]
    pub fn new(config: PathfinderConfig, passability: &PassabilityConfig) -> Self {
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(config.workers).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Failed to build path worker pool: {e}, computing paths inline");
                None
            }
        };
        let mut long_range = LongPathfinder::new();
        long_range.set_use_jump_point_cache(config.use_jump_point_cache);
        long_range.set_max_iterations(config.max_long_path_iterations);
        Self {
            config,
            classes: PassabilityClasses::from_config(passability),
            terrain_grid: Grid::new(0, 0),
            grid: Grid::new(0, 0),
            dirtiness: GridDirtiness::new(0, 0),
            terrain_dirty: false,
            hierarchical: HierarchicalPathfinder::new(),
            long_range,
            long_requests: Vec::new(),
            short_requests: Vec::new(),
            results: Vec::new(),
            next_ticket: 1,
            pool,
        }
    }

    // ------------------------------------------------------------------
    // Passability classes
    // ------------------------------------------------------------------

    /// Mask of a class by name; unknown names log an error and give 0.
    #[must_use]
    pub fn pass_class(&self, name: &str) -> PassClassMask {
        self.classes.mask(name)
    }

    /// Mask of a class by name.
    pub fn try_pass_class(&self, name: &str) -> Result<PassClassMask> {
        self.classes.try_mask(name)
    }

    /// All classes, in mask-bit order.
    pub fn pass_classes(&self) -> impl Iterator<Item = &PassabilityClass> {
        self.classes.iter()
    }

    /// The class table.
    #[must_use]
    pub fn classes(&self) -> &PassabilityClasses {
        &self.classes
    }

    /// Clearance of a class.
    #[must_use]
    pub fn clearance(&self, mask: PassClassMask) -> Fixed {
        self.classes.clearance(mask)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Switch the long-range jump point cache on or off.
    pub fn set_use_jump_point_cache(&mut self, enabled: bool) {
        self.config.use_jump_point_cache = enabled;
        self.long_range.set_use_jump_point_cache(enabled);
    }

    // ------------------------------------------------------------------
    // Grid lifecycle
    // ------------------------------------------------------------------

    /// Rebuild the terrain-only grid from `terrain`. The live grid is
    /// rebuilt on the next [`Self::update_grid`].
    pub fn load_terrain(&mut self, terrain: &dyn TerrainSource, obstructions: &mut ObstructionManager) {
        let size = terrain.tiles_per_side().saturating_mul(NAVCELLS_PER_TILE);
        let shore = compute_shore_distances(terrain);
        let mut grid: NavcellGrid = Grid::new(size, size);

        for j in 0..size {
            for i in 0..size {
                let c = navcell_center(i, j);
                let depth = terrain.water_depth(c.x, c.y);
                let slope = terrain.slope(c.x, c.y);
                let shore_distance = shore.get(i / NAVCELLS_PER_TILE, j / NAVCELLS_PER_TILE);
                let blocked = self
                    .classes
                    .iter()
                    .filter(|class| !class.is_terrain_passable(depth, slope, shore_distance))
                    .fold(0, |data, class| data | class.mask);
                grid.set(i, j, blocked);
            }
        }

        let all = self.classes.iter().fold(0, |m, class| m | class.mask);
        for k in 0..size {
            // Map edges are impassable for every class.
            *grid.get_mut(k, 0) |= all;
            *grid.get_mut(k, size - 1) |= all;
            *grid.get_mut(0, k) |= all;
            *grid.get_mut(size - 1, k) |= all;
        }

        for class in self.classes.iter() {
            let clearance = (class.clearance() / NAVCELL_SIZE).ceil().to_num::<i32>();
            expand_impassable_cells(&mut grid, clearance, class.mask);
        }

        if obstructions.width() != size || obstructions.height() != size {
            obstructions.set_bounds(size, size);
        }
        obstructions.set_max_clearance(self.classes.max_clearance());
        self.terrain_grid = grid;
        self.terrain_dirty = true;
        self.long_range.reload(&self.terrain_grid, self.classes.iter().map(|c| c.mask));
        debug!(size, classes = self.classes.len(), "terrain grid rebuilt");
    }

    /// Apply pending terrain and obstruction changes to the live grid and
    /// the region tables.
    pub fn update_grid(&mut self, obstructions: &mut ObstructionManager) {
        let mut dirtiness = obstructions.take_dirtiness();
        if self.terrain_dirty
            || dirtiness.dirty_cells.width() != self.terrain_grid.width()
            || dirtiness.dirty_cells.height() != self.terrain_grid.height()
        {
            dirtiness = GridDirtiness::new(self.terrain_grid.width(), self.terrain_grid.height());
            dirtiness.mark_global();
            self.terrain_dirty = false;
        }
        if !dirtiness.dirty {
            self.dirtiness = dirtiness;
            return;
        }

        if dirtiness.global_recompute {
            self.grid = self.terrain_grid.clone();
            obstructions.rasterize(&mut self.grid, &self.classes, true);
            self.hierarchical.recompute(&self.grid, &self.classes);
        } else {
            for j in 0..self.grid.height() {
                for i in 0..self.grid.width() {
                    if dirtiness.dirty_cells.get(i, j) != 0 {
                        self.grid.set(i, j, self.terrain_grid.get(i, j));
                    }
                }
            }
            obstructions.rasterize(&mut self.grid, &self.classes, false);
            self.hierarchical.update(&self.grid, &dirtiness);
        }
        self.long_range.update(&dirtiness);
        debug!(global = dirtiness.global_recompute, "navcell grid updated");
        self.dirtiness = dirtiness;
    }

    /// The live navcell grid (terrain plus obstructions).
    #[must_use]
    pub fn grid(&self) -> &NavcellGrid {
        &self.grid
    }

    /// The terrain-only navcell grid.
    #[must_use]
    pub fn terrain_grid(&self) -> &NavcellGrid {
        &self.terrain_grid
    }

    /// Changes applied by the last [`Self::update_grid`].
    #[must_use]
    pub fn dirtiness(&self) -> &GridDirtiness {
        &self.dirtiness
    }

    /// The hierarchical pathfinder.
    #[must_use]
    pub fn hierarchical(&self) -> &HierarchicalPathfinder {
        &self.hierarchical
    }

    /// Global region ids of every navcell for one class.
    #[must_use]
    pub fn global_region_grid(&self, mask: PassClassMask) -> Grid<GlobalRegionId> {
        self.hierarchical.global_region_grid(mask)
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    fn take_ticket(&mut self) -> PathTicket {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1).max(1);
        ticket
    }

    /// Queue a long-range request; the result arrives after the next
    /// [`Self::start_processing_moves`].
    pub fn compute_path_async(
        &mut self,
        start: Vec2Fixed,
        goal: PathGoal,
        pass_class: PassClassMask,
        notify: EntityId,
    ) -> PathTicket {
        let ticket = self.take_ticket();
        trace!(ticket, notify, "long path requested");
        self.long_requests.push(LongPathRequest {
            ticket,
            start,
            goal,
            pass_class,
            notify,
        });
        ticket
    }

    /// Queue a short-range request. The request's ticket field is replaced.
    pub fn compute_short_path_async(&mut self, mut request: ShortPathRequest) -> PathTicket {
        let ticket = self.take_ticket();
        request.ticket = ticket;
        trace!(ticket, notify = request.notify, "short path requested");
        self.short_requests.push(request);
        ticket
    }

    /// Compute a long-range path right away.
    #[must_use]
    pub fn compute_path_immediate(&self, start: Vec2Fixed, goal: &PathGoal, pass_class: PassClassMask) -> WaypointPath {
        self.long_range
            .compute_path(&self.grid, &self.hierarchical, start.x, start.y, goal, pass_class)
    }

    /// Compute a short-range path right away.
    #[must_use]
    pub fn compute_short_path_immediate(
        &self,
        obstructions: &ObstructionManager,
        request: &ShortPathRequest,
    ) -> WaypointPath {
        compute_short_path(request, obstructions, &self.terrain_grid)
    }

    /// Number of requests waiting to be processed.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.long_requests.len() + self.short_requests.len()
    }

    fn process(&self, request: &PathRequest, obstructions: &ObstructionManager) -> PathResultMessage {
        match request {
            PathRequest::Long(r) => PathResultMessage {
                ticket: r.ticket,
                notify: r.notify,
                kind: PathKind::Long,
                path: self.compute_path_immediate(r.start, &r.goal, r.pass_class),
            },
            PathRequest::Short(r) => PathResultMessage {
                ticket: r.ticket,
                notify: r.notify,
                kind: PathKind::Short,
                path: self.compute_short_path_immediate(obstructions, r),
            },
        }
    }

    fn run_batch(&self, batch: &[PathRequest], obstructions: &ObstructionManager) -> Vec<PathResultMessage> {
        match &self.pool {
            Some(pool) => {
                let part = batch.len().div_ceil(pool.current_num_threads().max(1)).max(1);
                let parts: Vec<Vec<PathResultMessage>> = pool.install(|| {
                    batch
                        .par_chunks(part)
                        .map(|chunk| chunk.iter().map(|r| self.process(r, obstructions)).collect::<Vec<_>>())
                        .collect()
                });
                parts.into_iter().flatten().collect()
            }
            None => batch.iter().map(|r| self.process(r, obstructions)).collect(),
        }
    }

    /// Compute up to `max_same_turn_moves` queued requests, oldest ticket
    /// first. Results are kept until [`Self::fetch_async_results`].
    pub fn start_processing_moves(&mut self, obstructions: &ObstructionManager) {
        if self.pending_request_count() == 0 {
            return;
        }
        let mut queued: Vec<PathRequest> = self
            .long_requests
            .drain(..)
            .map(PathRequest::Long)
            .chain(self.short_requests.drain(..).map(PathRequest::Short))
            .collect();
        queued.sort_by_key(PathRequest::ticket);

        let limit = self.config.max_same_turn_moves.max(1);
        let deferred = if queued.len() > limit {
            queued.split_off(limit)
        } else {
            Vec::new()
        };
        for request in deferred {
            match request {
                PathRequest::Long(r) => self.long_requests.push(r),
                PathRequest::Short(r) => self.short_requests.push(r),
            }
        }

        let mut results = self.run_batch(&queued, obstructions);
        results.sort_by_key(|r| r.ticket);
        debug!(
            processed = results.len(),
            deferred = self.pending_request_count(),
            "path requests processed"
        );
        self.results.extend(results);
    }

    /// Take the computed results, in ticket order.
    pub fn fetch_async_results(&mut self) -> Vec<PathResultMessage> {
        std::mem::take(&mut self.results)
    }

    /// Snapshot of the queued requests and undelivered results.
    #[must_use]
    pub fn queue_state(&self) -> RequestQueueState {
        RequestQueueState {
            long_requests: self.long_requests.clone(),
            short_requests: self.short_requests.clone(),
            results: self.results.clone(),
            next_ticket: self.next_ticket,
        }
    }

    /// Replace the request queue with a saved one.
    pub fn restore_queue(&mut self, state: RequestQueueState) {
        self.long_requests = state.long_requests;
        self.short_requests = state.short_requests;
        self.results = state.results;
        self.next_ticket = state.next_ticket.max(1);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether a disc of radius `clearance` may move in a straight line from
    /// `a` to `b`: no obstruction passing `filter` is hit and the terrain
    /// allows it.
    #[must_use]
    pub fn check_movement(
        &self,
        obstructions: &ObstructionManager,
        filter: &ObstructionFilter,
        a: Vec2Fixed,
        b: Vec2Fixed,
        clearance: Fixed,
        pass_class: PassClassMask,
    ) -> bool {
        !obstructions.test_line(filter, a, b, clearance)
            && check_line_movement(a, b, pass_class, &self.terrain_grid)
    }

    fn terrain_allows(&self, spans: &[Span], pass_class: PassClassMask) -> bool {
        spans.iter().all(|span| {
            (span.i0..span.i1).all(|i| {
                self.terrain_grid
                    .is_passable_at(i32::from(i), i32::from(span.j), pass_class)
            })
        })
    }

    fn center_allowed(&self, p: Vec2Fixed, pass_class: PassClassMask) -> bool {
        let (i, j) = nearest_navcell(p.x, p.y, self.terrain_grid.width(), self.terrain_grid.height());
        self.terrain_grid.is_passable_at(i32::from(i), i32::from(j), pass_class)
    }

    fn on_map(&self, p: Vec2Fixed) -> bool {
        let size = Fixed::from_num(self.terrain_grid.width()) * NAVCELL_SIZE;
        p.x >= Fixed::ZERO && p.y >= Fixed::ZERO && p.x < size && p.y < size
    }

    /// Whether a unit of radius `clearance` may stand at `p`.
    #[must_use]
    pub fn check_unit_placement(
        &self,
        obstructions: &ObstructionManager,
        filter: &ObstructionFilter,
        p: Vec2Fixed,
        clearance: Fixed,
        pass_class: PassClassMask,
        only_center: bool,
    ) -> FoundationCheck {
        if pass_class == 0 || !self.on_map(p) {
            return FoundationCheck::FailError;
        }
        if obstructions.test_unit_shape(filter, p, clearance, None) {
            return FoundationCheck::FailObstructsFoundation;
        }
        let terrain_ok = if only_center {
            self.center_allowed(p, pass_class)
        } else {
            let spans = rasterize_circle_with_clearance(
                p,
                clearance,
                Fixed::ZERO,
                self.terrain_grid.width(),
                self.terrain_grid.height(),
            );
            self.center_allowed(p, pass_class) && self.terrain_allows(&spans, pass_class)
        };
        if terrain_ok {
            FoundationCheck::Success
        } else {
            FoundationCheck::FailTerrainClass
        }
    }

    /// Whether a building footprint `w x h` rotated by `angle` may be
    /// placed at `center`. `entity` is the building being placed, if it
    /// already exists.
    #[must_use]
    pub fn check_building_placement(
        &self,
        obstructions: &ObstructionManager,
        filter: &ObstructionFilter,
        center: Vec2Fixed,
        angle: Fixed,
        w: Fixed,
        h: Fixed,
        entity: EntityId,
        pass_class: PassClassMask,
        only_center: bool,
    ) -> FoundationCheck {
        if pass_class == 0 || !self.on_map(center) {
            return FoundationCheck::FailError;
        }
        if entity != INVALID_ENTITY && obstructions.shape_of_entity(entity).is_none() {
            return FoundationCheck::FailNoObstruction;
        }
        if obstructions.test_static_shape(filter, center, angle, w, h, None) {
            return FoundationCheck::FailObstructsFoundation;
        }
        let terrain_ok = if only_center {
            self.center_allowed(center, pass_class)
        } else {
            let (u, v) = axes_from_angle(angle);
            let spans = rasterize_rect_with_clearance(
                center,
                u,
                v,
                Vec2Fixed::new(w / 2, h / 2),
                self.classes.clearance(pass_class),
                self.terrain_grid.width(),
                self.terrain_grid.height(),
            );
            self.terrain_allows(&spans, pass_class)
        };
        if terrain_ok {
            FoundationCheck::Success
        } else {
            FoundationCheck::FailTerrainClass
        }
    }

    /// Whether any part of `goal` is reachable from `start`.
    #[must_use]
    pub fn is_goal_reachable(&self, start: Vec2Fixed, goal: &PathGoal, pass_class: PassClassMask) -> bool {
        let (i, j) = nearest_navcell(start.x, start.y, self.grid.width(), self.grid.height());
        self.hierarchical.is_goal_reachable(i, j, goal, pass_class)
    }

    /// `p` itself if its navcell is passable, otherwise the center of the
    /// nearest passable navcell.
    #[must_use]
    pub fn nearest_passable_point(&self, p: Vec2Fixed, pass_class: PassClassMask) -> Option<Vec2Fixed> {
        let (i, j) = nearest_navcell(p.x, p.y, self.grid.width(), self.grid.height());
        if self.grid.is_passable_at(i32::from(i), i32::from(j), pass_class) {
            return Some(p);
        }
        let nearest = self.hierarchical.find_nearest_passable_navcell(i, j, pass_class);
        if nearest.is_none() {
            error!(pass_class, "No passable navcell on the map");
        }
        nearest.map(|(i, j)| navcell_center(i, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstruction::ObstructionFlags;
    use crate::terrain::HeightmapTerrain;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    const BLOCKING: ObstructionFlags = ObstructionFlags(
        ObstructionFlags::BLOCK_MOVEMENT.0
            | ObstructionFlags::BLOCK_PATHFINDING.0
            | ObstructionFlags::BLOCK_FOUNDATION.0
            | ObstructionFlags::BLOCK_CONSTRUCTION.0,
    );

    /// 64x64 navcell flat map with the default classes.
    fn setup(workers: usize) -> (Pathfinder, ObstructionManager) {
        let config = PathfinderConfig {
            workers,
            ..PathfinderConfig::default()
        };
        let mut pathfinder = Pathfinder::new(config, &PassabilityConfig::default());
        let mut obstructions = ObstructionManager::new(64, 64);
        pathfinder.load_terrain(&HeightmapTerrain::flat(16), &mut obstructions);
        pathfinder.update_grid(&mut obstructions);
        (pathfinder, obstructions)
    }

    fn add_building(m: &mut ObstructionManager, entity: EntityId, at: Vec2Fixed, w: i32, h: i32) {
        m.add_static_shape(entity, at, Fixed::ZERO, fixed(w), fixed(h), BLOCKING, entity, INVALID_ENTITY);
    }

    #[test]
    fn test_config_ron_defaults() {
        let config = PathfinderConfig::from_ron_str("test", "PathfinderConfig(workers: 2)").expect("valid");
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_same_turn_moves, 64);
        assert!(config.use_jump_point_cache);
        assert!(PathfinderConfig::from_ron_str("test", "PathfinderConfig(workers: )").is_err());
    }

    #[test]
    fn test_outer_ring_is_impassable() {
        let (pf, _) = setup(1);
        let mask = pf.pass_class("default");
        assert!(!pf.grid().is_passable_at(0, 10, mask));
        assert!(!pf.grid().is_passable_at(63, 63, mask));
        assert!(pf.grid().is_passable_at(10, 10, mask));
        // The large class keeps its clearance from the edge.
        let large = pf.pass_class("large");
        assert!(!pf.terrain_grid().is_passable_at(3, 10, large));
        assert!(pf.terrain_grid().is_passable_at(6, 10, large));
    }

    #[test]
    fn test_unknown_class_is_zero() {
        let (pf, _) = setup(1);
        assert_eq!(pf.pass_class("hovercraft"), 0);
        assert!(pf.try_pass_class("hovercraft").is_err());
        assert_eq!(pf.pass_classes().count(), 5);
    }

    #[test]
    fn test_obstruction_updates_grid_and_regions() {
        let (mut pf, mut obstructions) = setup(1);
        let mask = pf.pass_class("default");
        assert_eq!(pf.hierarchical().global_region_count(mask), 1);

        // Full-height wall splits the map.
        add_building(&mut obstructions, 9, vec2(32, 32), 2, 64);
        pf.update_grid(&mut obstructions);
        assert!(!pf.grid().is_passable_at(32, 20, mask));
        assert!(pf.dirtiness().dirty);
        assert_eq!(pf.hierarchical().global_region_count(mask), 2);
        let goal = PathGoal::point(vec2(50, 20));
        assert!(!pf.is_goal_reachable(vec2(10, 20), &goal, mask));

        let tag = obstructions.shape_of_entity(9).expect("shape");
        obstructions.remove_shape(tag).expect("live shape");
        pf.update_grid(&mut obstructions);
        assert!(pf.grid().is_passable_at(32, 20, mask));
        assert!(pf.is_goal_reachable(vec2(10, 20), &goal, mask));
    }

    #[test]
    fn test_requests_are_capped_and_ordered() {
        let (mut pf, obstructions) = setup(2);
        pf.config.max_same_turn_moves = 3;
        let mask = pf.pass_class("default");
        let mut tickets = Vec::new();
        for k in 0..5 {
            tickets.push(pf.compute_path_async(vec2(10, 10), PathGoal::point(vec2(40, 10 + k)), mask, 100 + k as u64));
        }
        pf.start_processing_moves(&obstructions);
        let first = pf.fetch_async_results();
        assert_eq!(first.iter().map(|r| r.ticket).collect::<Vec<_>>(), tickets[..3].to_vec());
        assert_eq!(pf.pending_request_count(), 2);

        pf.start_processing_moves(&obstructions);
        let second = pf.fetch_async_results();
        assert_eq!(second.iter().map(|r| r.ticket).collect::<Vec<_>>(), tickets[3..].to_vec());
        assert!(second.iter().all(|r| r.kind == PathKind::Long && !r.path.is_empty()));
    }

    #[test]
    fn test_results_do_not_depend_on_worker_count() {
        let run = |workers: usize| {
            let (mut pf, mut obstructions) = setup(workers);
            add_building(&mut obstructions, 9, vec2(32, 30), 4, 40);
            pf.update_grid(&mut obstructions);
            let mask = pf.pass_class("default");
            for k in 0..12 {
                pf.compute_path_async(vec2(8, 8 + 3 * k), PathGoal::point(vec2(56, 50 - 3 * k)), mask, k as u64 + 1);
                pf.compute_short_path_async(ShortPathRequest {
                    ticket: 0,
                    start: vec2(26, 8 + 3 * k),
                    clearance: fixed(1),
                    range: fixed(12),
                    goal: PathGoal::point(vec2(38, 8 + 3 * k)),
                    pass_class: mask,
                    avoid_moving_units: false,
                    group: 1000,
                    notify: k as u64 + 1,
                });
            }
            pf.start_processing_moves(&obstructions);
            pf.fetch_async_results()
        };
        let single = run(1);
        assert_eq!(single.len(), 24);
        assert_eq!(single, run(4));
    }

    #[test]
    fn test_check_movement_uses_obstructions_and_terrain() {
        let (pf, mut obstructions) = setup(1);
        add_building(&mut obstructions, 9, vec2(32, 32), 4, 4);
        let mask = pf.pass_class("default");
        let filter = ObstructionFilter::ControlGroupMovement {
            avoid_moving: false,
            group: 1,
        };
        assert!(!pf.check_movement(&obstructions, &filter, vec2(20, 32), vec2(40, 32), fixed(1), mask));
        assert!(pf.check_movement(&obstructions, &filter, vec2(20, 20), vec2(40, 20), fixed(1), mask));
        // Into the impassable map edge.
        assert!(!pf.check_movement(&obstructions, &filter, vec2(5, 20), vec2(0, 20), fixed(1), mask));
    }

    #[test]
    fn test_placement_checks() {
        let (pf, mut obstructions) = setup(1);
        add_building(&mut obstructions, 9, vec2(32, 32), 6, 6);
        let land = pf.pass_class("building-land");
        let filter = ObstructionFilter::skip_control_groups_require_flags(
            77,
            INVALID_ENTITY,
            ObstructionFlags::BLOCK_FOUNDATION,
        );
        let place = |at: Vec2Fixed| {
            pf.check_building_placement(&obstructions, &filter, at, Fixed::ZERO, fixed(4), fixed(4), INVALID_ENTITY, land, false)
        };
        assert_eq!(place(vec2(20, 20)), FoundationCheck::Success);
        assert_eq!(place(vec2(34, 34)), FoundationCheck::FailObstructsFoundation);
        assert_eq!(place(vec2(1, 20)), FoundationCheck::FailTerrainClass);
        assert_eq!(place(vec2(-5, 20)), FoundationCheck::FailError);
        assert_eq!(
            pf.check_building_placement(&obstructions, &filter, vec2(20, 20), Fixed::ZERO, fixed(4), fixed(4), 12345, land, false),
            FoundationCheck::FailNoObstruction
        );

        let default = pf.pass_class("default");
        assert_eq!(
            pf.check_unit_placement(&obstructions, &filter, vec2(10, 10), fixed(1), default, true),
            FoundationCheck::Success
        );
        assert_eq!(
            pf.check_unit_placement(&obstructions, &filter, vec2(32, 32), fixed(1), default, true),
            FoundationCheck::FailObstructsFoundation
        );
    }

    #[test]
    fn test_nearest_passable_point() {
        let (mut pf, mut obstructions) = setup(1);
        add_building(&mut obstructions, 9, vec2(32, 32), 8, 8);
        pf.update_grid(&mut obstructions);
        let mask = pf.pass_class("default");
        assert_eq!(pf.nearest_passable_point(vec2(10, 10), mask), Some(vec2(10, 10)));
        let snapped = pf.nearest_passable_point(vec2(32, 32), mask).expect("passable cell");
        let (i, j) = nearest_navcell(snapped.x, snapped.y, 64, 64);
        assert!(pf.grid().is_passable_at(i32::from(i), i32::from(j), mask));
    }
}
