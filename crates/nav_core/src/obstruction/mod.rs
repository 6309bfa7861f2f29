//! Obstruction index.
//!
//! Registry of every unit and building footprint on the map. Unit shapes
//! are circles, static shapes are oriented rectangles; each kind lives in
//! its own arena and its own spatial subdivision. The index answers
//! collision and range queries and stamps shapes onto the navcell grid.
//!
//! Shape changes that can affect the navcell grid are recorded as
//! dirtiness: the changed area grown by the largest class clearance, plus
//! the set of nearby shapes whose grown footprint must be restamped.

mod filter;
mod range;
mod rasterize;
mod shape;
mod subdivision;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, INVALID_ENTITY};
use crate::error::{NavError, Result};
use crate::geometry::{
    distance_to_square, half_bounding_box, test_ray_circle, test_ray_square, test_square_square,
    within_radius,
};
use crate::grid::{nearest_navcell, GridDirtiness, NavcellGrid, PassClassMask, NAVCELL_SIZE};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::passability::{ObstructionPolicy, PassabilityClasses};

pub use filter::ObstructionFilter;
pub use range::{
    are_shapes_in_range, distance_between_shapes, is_point_in_point_range,
    is_shape_in_point_range, max_distance_between_shapes, RangeShape, DIST_TOLERANCE,
};
pub use rasterize::{
    rasterize_circle_with_clearance, rasterize_rect_with_clearance, stamp_spans, Span,
};
pub use shape::{
    axes_from_angle, ObstructionFlags, ObstructionSquare, ShapeTag, StaticShape, UnitShape,
};
pub use subdivision::{SpatialSubdivision, DEFAULT_DIVISION_SIZE};

/// Flags whose shapes are stamped onto the navcell grid.
const GRID_FLAGS: ObstructionFlags = ObstructionFlags(
    ObstructionFlags::BLOCK_PATHFINDING.0 | ObstructionFlags::BLOCK_FOUNDATION.0,
);

/// Persistent part of the obstruction index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObstructionState {
    /// Map width in navcells.
    pub width: u16,
    /// Map height in navcells.
    pub height: u16,
    /// Unit arena (removed slots stay `None`).
    pub unit_shapes: Vec<Option<UnitShape>>,
    /// Static arena (removed slots stay `None`).
    pub static_shapes: Vec<Option<StaticShape>>,
    /// Largest passability class clearance.
    #[serde(with = "fixed_serde")]
    pub max_clearance: Fixed,
}

/// The obstruction index.
#[derive(Debug, Clone)]
pub struct ObstructionManager {
    width: u16,
    height: u16,
    unit_shapes: Vec<Option<UnitShape>>,
    static_shapes: Vec<Option<StaticShape>>,
    unit_subdivision: SpatialSubdivision<u32>,
    static_subdivision: SpatialSubdivision<u32>,
    entity_shapes: BTreeMap<EntityId, ShapeTag>,
    max_clearance: Fixed,
    dirtiness: GridDirtiness,
    dirty_static: BTreeSet<u32>,
    dirty_unit: BTreeSet<u32>,
}

fn new_subdivision(width: u16, height: u16) -> SpatialSubdivision<u32> {
    SpatialSubdivision::new(
        Fixed::from_num(width) * NAVCELL_SIZE,
        Fixed::from_num(height) * NAVCELL_SIZE,
        DEFAULT_DIVISION_SIZE,
    )
}

fn unit_bounds(shape: &UnitShape) -> (Vec2Fixed, Vec2Fixed) {
    let half = shape.half_bounds();
    (shape.center - half, shape.center + half)
}

fn static_bounds(shape: &StaticShape) -> (Vec2Fixed, Vec2Fixed) {
    let half = shape.half_bounds();
    (shape.center - half, shape.center + half)
}

fn boxes_overlap(min0: Vec2Fixed, max0: Vec2Fixed, min1: Vec2Fixed, max1: Vec2Fixed) -> bool {
    min0.x <= max1.x && min1.x <= max0.x && min0.y <= max1.y && min1.y <= max0.y
}

fn grow(min: Vec2Fixed, max: Vec2Fixed, by: Fixed) -> (Vec2Fixed, Vec2Fixed) {
    let d = Vec2Fixed::new(by, by);
    (min - d, max + d)
}

/// Record a hit; returns true when the caller can stop searching.
fn report(out: &mut Option<&mut Vec<EntityId>>, entity: EntityId) -> bool {
    match out {
        Some(list) => {
            list.push(entity);
            false
        }
        None => true,
    }
}

impl ObstructionManager {
    /// Create an empty index for a map of `width x height` navcells.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            unit_shapes: Vec::new(),
            static_shapes: Vec::new(),
            unit_subdivision: new_subdivision(width, height),
            static_subdivision: new_subdivision(width, height),
            entity_shapes: BTreeMap::new(),
            max_clearance: Fixed::ZERO,
            dirtiness: GridDirtiness::new(width, height),
            dirty_static: BTreeSet::new(),
            dirty_unit: BTreeSet::new(),
        }
    }

    /// Rebuild the index from a saved state. The whole grid is marked dirty.
    #[must_use]
    pub fn from_state(state: ObstructionState) -> Self {
        let mut manager = Self::new(state.width, state.height);
        manager.max_clearance = state.max_clearance;
        for (index, shape) in state.unit_shapes.iter().enumerate() {
            if let Some(shape) = shape {
                let (min, max) = unit_bounds(shape);
                manager.unit_subdivision.add(index as u32, min, max);
                manager.entity_shapes.insert(shape.entity, ShapeTag::Unit(index as u32));
            }
        }
        for (index, shape) in state.static_shapes.iter().enumerate() {
            if let Some(shape) = shape {
                let (min, max) = static_bounds(shape);
                manager.static_subdivision.add(index as u32, min, max);
                manager.entity_shapes.insert(shape.entity, ShapeTag::Static(index as u32));
            }
        }
        manager.unit_shapes = state.unit_shapes;
        manager.static_shapes = state.static_shapes;
        manager.dirtiness.mark_global();
        manager
    }

    /// Snapshot of the persistent state.
    #[must_use]
    pub fn state(&self) -> ObstructionState {
        ObstructionState {
            width: self.width,
            height: self.height,
            unit_shapes: self.unit_shapes.clone(),
            static_shapes: self.static_shapes.clone(),
            max_clearance: self.max_clearance,
        }
    }

    /// Resize the map. Shapes are kept; the whole grid becomes dirty.
    pub fn set_bounds(&mut self, width: u16, height: u16) {
        let state = ObstructionState {
            width,
            height,
            ..self.state()
        };
        *self = Self::from_state(state);
    }

    /// Set the largest clearance of any passability class.
    pub fn set_max_clearance(&mut self, clearance: Fixed) {
        self.max_clearance = clearance;
    }

    /// Map width in navcells.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Map height in navcells.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    // ------------------------------------------------------------------
    // Dirtiness
    // ------------------------------------------------------------------

    fn mark_dirty(&mut self, flags: ObstructionFlags, min: Vec2Fixed, max: Vec2Fixed) {
        if !flags.intersects(GRID_FLAGS) {
            return;
        }
        let (cell_min, cell_max) = grow(min, max, self.max_clearance);
        let (i0, j0) = nearest_navcell(cell_min.x, cell_min.y, self.width, self.height);
        let (i1, j1) = nearest_navcell(cell_max.x, cell_max.y, self.width, self.height);
        for j in j0..=j1 {
            for i in i0..=i1 {
                self.dirtiness.mark(i, j);
            }
        }

        let (near_min, near_max) = grow(min, max, self.max_clearance * 2);
        for index in self.static_subdivision.get_in_range(near_min, near_max) {
            if let Some(shape) = &self.static_shapes[index as usize] {
                if shape.flags.intersects(GRID_FLAGS) {
                    self.dirty_static.insert(index);
                }
            }
        }
        for index in self.unit_subdivision.get_in_range(near_min, near_max) {
            if let Some(shape) = &self.unit_shapes[index as usize] {
                if shape.flags.intersects(GRID_FLAGS) {
                    self.dirty_unit.insert(index);
                }
            }
        }
    }

    /// Grid changes accumulated since the last call.
    pub fn take_dirtiness(&mut self) -> GridDirtiness {
        std::mem::replace(&mut self.dirtiness, GridDirtiness::new(self.width, self.height))
    }

    /// Grid changes accumulated so far.
    #[must_use]
    pub fn dirtiness(&self) -> &GridDirtiness {
        &self.dirtiness
    }

    // ------------------------------------------------------------------
    // Shape lifecycle
    // ------------------------------------------------------------------

    fn bind_entity(&mut self, entity: EntityId, tag: ShapeTag) {
        if let Some(previous) = self.entity_shapes.insert(entity, tag) {
            tracing::warn!(entity, ?previous, ?tag, "Entity already had an obstruction shape");
        }
    }

    /// Register a circular unit obstruction.
    ///
    /// An invalid control group defaults to the owning entity.
    pub fn add_unit_shape(
        &mut self,
        entity: EntityId,
        center: Vec2Fixed,
        clearance: Fixed,
        flags: ObstructionFlags,
        group: EntityId,
    ) -> ShapeTag {
        if clearance <= Fixed::ZERO {
            tracing::warn!(entity, "Unit obstruction with non-positive clearance");
        }
        let shape = UnitShape {
            entity,
            center,
            clearance,
            flags,
            group: if group == INVALID_ENTITY { entity } else { group },
        };
        let index = self.unit_shapes.len() as u32;
        let (min, max) = unit_bounds(&shape);
        self.unit_subdivision.add(index, min, max);
        self.unit_shapes.push(Some(shape));
        let tag = ShapeTag::Unit(index);
        self.bind_entity(entity, tag);
        self.mark_dirty(flags, min, max);
        tag
    }

    /// Register an oriented rectangular obstruction of full size `w x h`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_static_shape(
        &mut self,
        entity: EntityId,
        center: Vec2Fixed,
        angle: Fixed,
        w: Fixed,
        h: Fixed,
        flags: ObstructionFlags,
        group: EntityId,
        group2: EntityId,
    ) -> ShapeTag {
        let (u, v) = axes_from_angle(angle);
        let shape = StaticShape {
            entity,
            center,
            u,
            v,
            hw: w / 2,
            hh: h / 2,
            flags,
            group: if group == INVALID_ENTITY { entity } else { group },
            group2,
        };
        let index = self.static_shapes.len() as u32;
        let (min, max) = static_bounds(&shape);
        self.static_subdivision.add(index, min, max);
        self.static_shapes.push(Some(shape));
        let tag = ShapeTag::Static(index);
        self.bind_entity(entity, tag);
        self.mark_dirty(flags, min, max);
        tag
    }

    /// Remove a shape. Its tag is never handed out again.
    pub fn remove_shape(&mut self, tag: ShapeTag) -> Result<()> {
        let (entity, flags, min, max) = match tag {
            ShapeTag::Unit(index) => {
                let shape = self
                    .unit_shapes
                    .get_mut(index as usize)
                    .and_then(Option::take)
                    .ok_or(NavError::UnknownTag(tag))?;
                let (min, max) = unit_bounds(&shape);
                self.unit_subdivision.remove(index, min, max);
                self.dirty_unit.remove(&index);
                (shape.entity, shape.flags, min, max)
            }
            ShapeTag::Static(index) => {
                let shape = self
                    .static_shapes
                    .get_mut(index as usize)
                    .and_then(Option::take)
                    .ok_or(NavError::UnknownTag(tag))?;
                let (min, max) = static_bounds(&shape);
                self.static_subdivision.remove(index, min, max);
                self.dirty_static.remove(&index);
                (shape.entity, shape.flags, min, max)
            }
        };
        if self.entity_shapes.get(&entity) == Some(&tag) {
            self.entity_shapes.remove(&entity);
        }
        self.mark_dirty(flags, min, max);
        Ok(())
    }

    /// Move a shape. `angle` is ignored for unit shapes.
    pub fn move_shape(&mut self, tag: ShapeTag, center: Vec2Fixed, angle: Fixed) -> Result<()> {
        match tag {
            ShapeTag::Unit(index) => {
                let shape = self.unit_mut(tag)?;
                if shape.center == center {
                    return Ok(());
                }
                let (old_min, old_max) = unit_bounds(shape);
                shape.center = center;
                let flags = shape.flags;
                let (new_min, new_max) = unit_bounds(shape);
                self.unit_subdivision
                    .relocate(index, old_min, old_max, new_min, new_max);
                self.mark_dirty(flags, old_min, old_max);
                self.mark_dirty(flags, new_min, new_max);
            }
            ShapeTag::Static(index) => {
                let (u, v) = axes_from_angle(angle);
                let shape = self.static_mut(tag)?;
                let (old_min, old_max) = static_bounds(shape);
                shape.center = center;
                shape.u = u;
                shape.v = v;
                let flags = shape.flags;
                let (new_min, new_max) = static_bounds(shape);
                self.static_subdivision.remove(index, old_min, old_max);
                self.static_subdivision.add(index, new_min, new_max);
                self.mark_dirty(flags, old_min, old_max);
                self.mark_dirty(flags, new_min, new_max);
            }
        }
        Ok(())
    }

    fn unit_mut(&mut self, tag: ShapeTag) -> Result<&mut UnitShape> {
        match tag {
            ShapeTag::Unit(index) => self
                .unit_shapes
                .get_mut(index as usize)
                .and_then(Option::as_mut)
                .ok_or(NavError::UnknownTag(tag)),
            ShapeTag::Static(_) => Err(NavError::UnknownTag(tag)),
        }
    }

    fn static_mut(&mut self, tag: ShapeTag) -> Result<&mut StaticShape> {
        match tag {
            ShapeTag::Static(index) => self
                .static_shapes
                .get_mut(index as usize)
                .and_then(Option::as_mut)
                .ok_or(NavError::UnknownTag(tag)),
            ShapeTag::Unit(_) => Err(NavError::UnknownTag(tag)),
        }
    }

    /// Set or clear the moving flag of a unit shape.
    pub fn set_unit_moving_flag(&mut self, tag: ShapeTag, moving: bool) -> Result<()> {
        self.unit_mut(tag)?.flags.set(ObstructionFlags::MOVING, moving);
        Ok(())
    }

    /// Change the control group of a unit shape.
    pub fn set_unit_control_group(&mut self, tag: ShapeTag, group: EntityId) -> Result<()> {
        if group == INVALID_ENTITY {
            tracing::error!(?tag, "Refusing invalid control group for unit shape");
            return Ok(());
        }
        self.unit_mut(tag)?.group = group;
        Ok(())
    }

    /// Change both control groups of a static shape.
    pub fn set_static_control_group(
        &mut self,
        tag: ShapeTag,
        group: EntityId,
        group2: EntityId,
    ) -> Result<()> {
        let shape = self.static_mut(tag)?;
        if group == INVALID_ENTITY {
            tracing::error!(?tag, "Invalid primary control group, using the owner");
            shape.group = shape.entity;
        } else {
            shape.group = group;
        }
        shape.group2 = group2;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Unit shape behind a tag.
    #[must_use]
    pub fn unit_shape(&self, tag: ShapeTag) -> Option<&UnitShape> {
        match tag {
            ShapeTag::Unit(index) => self.unit_shapes.get(index as usize)?.as_ref(),
            ShapeTag::Static(_) => None,
        }
    }

    /// Static shape behind a tag.
    #[must_use]
    pub fn static_shape(&self, tag: ShapeTag) -> Option<&StaticShape> {
        match tag {
            ShapeTag::Static(index) => self.static_shapes.get(index as usize)?.as_ref(),
            ShapeTag::Unit(_) => None,
        }
    }

    /// Whether the tag refers to a live shape.
    #[must_use]
    pub fn is_valid(&self, tag: ShapeTag) -> bool {
        self.get_obstruction(tag).is_some()
    }

    /// Square view of a shape, exactly as supplied when it was added.
    #[must_use]
    pub fn get_obstruction(&self, tag: ShapeTag) -> Option<ObstructionSquare> {
        match tag {
            ShapeTag::Unit(_) => self
                .unit_shape(tag)
                .map(|s| ObstructionSquare::from_unit(tag, s)),
            ShapeTag::Static(_) => self
                .static_shape(tag)
                .map(|s| ObstructionSquare::from_static(tag, s)),
        }
    }

    /// Flags of a shape.
    #[must_use]
    pub fn flags(&self, tag: ShapeTag) -> Option<ObstructionFlags> {
        match tag {
            ShapeTag::Unit(_) => self.unit_shape(tag).map(|s| s.flags),
            ShapeTag::Static(_) => self.static_shape(tag).map(|s| s.flags),
        }
    }

    /// Shape owned by an entity.
    #[must_use]
    pub fn shape_of_entity(&self, entity: EntityId) -> Option<ShapeTag> {
        self.entity_shapes.get(&entity).copied()
    }

    /// Number of live shapes.
    #[must_use]
    pub fn shape_count(&self) -> usize {
        self.entity_shapes.len()
    }

    // ------------------------------------------------------------------
    // Collision tests
    // ------------------------------------------------------------------

    /// Whether a disc of radius `r` swept from `a` to `b` hits a shape.
    ///
    /// One-sided: a sweep starting inside a shape may leave it freely.
    #[must_use]
    pub fn test_line(&self, filter: &ObstructionFilter, a: Vec2Fixed, b: Vec2Fixed, r: Fixed) -> bool {
        let lo = Vec2Fixed::new(a.x.min(b.x), a.y.min(b.y));
        let hi = Vec2Fixed::new(a.x.max(b.x), a.y.max(b.y));
        let (min, max) = grow(lo, hi, r);

        for index in self.unit_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.unit_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Unit(index), shape.flags, shape.group, INVALID_ENTITY) {
                continue;
            }
            if test_ray_circle(a - shape.center, b - shape.center, shape.clearance + r) {
                return true;
            }
        }

        for index in self.static_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.static_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Static(index), shape.flags, shape.group, shape.group2) {
                continue;
            }
            let half = Vec2Fixed::new(shape.hw + r, shape.hh + r);
            if test_ray_square(a - shape.center, b - shape.center, shape.u, shape.v, half) {
                return true;
            }
        }
        false
    }

    /// Whether an oriented rectangle collides with any shape. Touching
    /// counts as colliding.
    ///
    /// With `out`, every colliding entity is collected instead of stopping at
    /// the first hit.
    #[allow(clippy::too_many_arguments)]
    pub fn test_static_shape(
        &self,
        filter: &ObstructionFilter,
        center: Vec2Fixed,
        angle: Fixed,
        w: Fixed,
        h: Fixed,
        mut out: Option<&mut Vec<EntityId>>,
    ) -> bool {
        let (u, v) = axes_from_angle(angle);
        let half = Vec2Fixed::new(w / 2, h / 2);
        let bounds = half_bounding_box(u, v, half);
        let (min, max) = (center - bounds, center + bounds);
        let mut collided = false;

        for index in self.static_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.static_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Static(index), shape.flags, shape.group, shape.group2) {
                continue;
            }
            if test_square_square(center, u, v, half, shape.center, shape.u, shape.v, shape.half()) {
                collided = true;
                if report(&mut out, shape.entity) {
                    return true;
                }
            }
        }

        for index in self.unit_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.unit_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Unit(index), shape.flags, shape.group, INVALID_ENTITY) {
                continue;
            }
            if distance_to_square(shape.center - center, u, v, half, true) <= shape.clearance {
                collided = true;
                if report(&mut out, shape.entity) {
                    return true;
                }
            }
        }
        collided
    }

    /// Whether a unit circle of `clearance` at `center` collides with any
    /// shape. Touching counts as colliding.
    pub fn test_unit_shape(
        &self,
        filter: &ObstructionFilter,
        center: Vec2Fixed,
        clearance: Fixed,
        mut out: Option<&mut Vec<EntityId>>,
    ) -> bool {
        let (min, max) = grow(center, center, clearance);
        let mut collided = false;

        for index in self.unit_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.unit_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Unit(index), shape.flags, shape.group, INVALID_ENTITY) {
                continue;
            }
            if within_radius(shape.center - center, shape.clearance + clearance) {
                collided = true;
                if report(&mut out, shape.entity) {
                    return true;
                }
            }
        }

        for index in self.static_subdivision.get_in_range(min, max) {
            let Some(shape) = &self.static_shapes[index as usize] else {
                continue;
            };
            if !filter.test(ShapeTag::Static(index), shape.flags, shape.group, shape.group2) {
                continue;
            }
            if distance_to_square(center - shape.center, shape.u, shape.v, shape.half(), true)
                <= clearance
            {
                collided = true;
                if report(&mut out, shape.entity) {
                    return true;
                }
            }
        }
        collided
    }

    // ------------------------------------------------------------------
    // Range queries
    // ------------------------------------------------------------------

    /// Unit shapes whose bounding box overlaps `[min, max]`.
    #[must_use]
    pub fn get_unit_obstructions_in_range(
        &self,
        filter: &ObstructionFilter,
        min: Vec2Fixed,
        max: Vec2Fixed,
    ) -> Vec<ObstructionSquare> {
        self.unit_subdivision
            .get_in_range(min, max)
            .into_iter()
            .filter_map(|index| {
                let shape = self.unit_shapes[index as usize].as_ref()?;
                let tag = ShapeTag::Unit(index);
                let (lo, hi) = unit_bounds(shape);
                (boxes_overlap(lo, hi, min, max)
                    && filter.test(tag, shape.flags, shape.group, INVALID_ENTITY))
                .then(|| ObstructionSquare::from_unit(tag, shape))
            })
            .collect()
    }

    /// Static shapes whose bounding box overlaps `[min, max]`.
    #[must_use]
    pub fn get_static_obstructions_in_range(
        &self,
        filter: &ObstructionFilter,
        min: Vec2Fixed,
        max: Vec2Fixed,
    ) -> Vec<ObstructionSquare> {
        self.static_subdivision
            .get_in_range(min, max)
            .into_iter()
            .filter_map(|index| {
                let shape = self.static_shapes[index as usize].as_ref()?;
                let tag = ShapeTag::Static(index);
                let (lo, hi) = static_bounds(shape);
                (boxes_overlap(lo, hi, min, max)
                    && filter.test(tag, shape.flags, shape.group, shape.group2))
                .then(|| ObstructionSquare::from_static(tag, shape))
            })
            .collect()
    }

    /// All shapes whose bounding box overlaps `[min, max]`, statics first.
    #[must_use]
    pub fn get_obstructions_in_range(
        &self,
        filter: &ObstructionFilter,
        min: Vec2Fixed,
        max: Vec2Fixed,
    ) -> Vec<ObstructionSquare> {
        let mut out = self.get_static_obstructions_in_range(filter, min, max);
        out.extend(self.get_unit_obstructions_in_range(filter, min, max));
        out
    }

    /// Entities of unit shapes standing on `square` (strict overlap).
    #[must_use]
    pub fn get_units_on_obstruction(
        &self,
        square: &ObstructionSquare,
        filter: &ObstructionFilter,
    ) -> Vec<EntityId> {
        let bounds = half_bounding_box(square.u, square.v, square.half());
        let (min, max) = (square.center - bounds, square.center + bounds);
        self.unit_subdivision
            .get_in_range(min, max)
            .into_iter()
            .filter_map(|index| {
                let shape = self.unit_shapes[index as usize].as_ref()?;
                let tag = ShapeTag::Unit(index);
                let inside = distance_to_square(shape.center - square.center, square.u, square.v, square.half(), true)
                    < shape.clearance;
                (inside && filter.test(tag, shape.flags, shape.group, INVALID_ENTITY))
                    .then_some(shape.entity)
            })
            .collect()
    }

    /// Entities of static shapes overlapping `square`.
    #[must_use]
    pub fn get_static_obstructions_on_obstruction(
        &self,
        square: &ObstructionSquare,
        filter: &ObstructionFilter,
    ) -> Vec<EntityId> {
        let bounds = half_bounding_box(square.u, square.v, square.half());
        let (min, max) = (square.center - bounds, square.center + bounds);
        self.static_subdivision
            .get_in_range(min, max)
            .into_iter()
            .filter_map(|index| {
                let shape = self.static_shapes[index as usize].as_ref()?;
                let tag = ShapeTag::Static(index);
                let hit = test_square_square(
                    square.center,
                    square.u,
                    square.v,
                    square.half(),
                    shape.center,
                    shape.u,
                    shape.v,
                    shape.half(),
                );
                (hit && tag != square.tag && filter.test(tag, shape.flags, shape.group, shape.group2))
                    .then_some(shape.entity)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Distances
    // ------------------------------------------------------------------

    /// Footprint of an entity: its obstruction if it has one, otherwise the
    /// point `position`.
    #[must_use]
    pub fn range_shape(&self, entity: EntityId, position: Vec2Fixed) -> RangeShape {
        let Some(tag) = self.shape_of_entity(entity) else {
            return RangeShape::Point(position);
        };
        if let Some(shape) = self.unit_shape(tag) {
            RangeShape::Circle {
                center: shape.center,
                radius: shape.clearance,
            }
        } else if let Some(shape) = self.static_shape(tag) {
            RangeShape::Square {
                center: shape.center,
                u: shape.u,
                v: shape.v,
                half: shape.half(),
            }
        } else {
            RangeShape::Point(position)
        }
    }

    /// Nearest distance from an entity's footprint to a point.
    #[must_use]
    pub fn distance_to_point(&self, entity: EntityId, position: Vec2Fixed, p: Vec2Fixed) -> Fixed {
        self.range_shape(entity, position).distance_to_point(p)
    }

    /// Farthest distance from an entity's footprint to a point.
    #[must_use]
    pub fn max_distance_to_point(&self, entity: EntityId, position: Vec2Fixed, p: Vec2Fixed) -> Fixed {
        self.range_shape(entity, position).max_distance_to_point(p)
    }

    /// Whether an entity's footprint is within `[min, max]` of a point.
    #[must_use]
    pub fn is_in_point_range(
        &self,
        entity: EntityId,
        position: Vec2Fixed,
        p: Vec2Fixed,
        min: Fixed,
        max: Fixed,
        opposite: bool,
    ) -> bool {
        is_shape_in_point_range(&self.range_shape(entity, position), p, min, max, opposite)
    }

    /// Whether two entities' footprints are within `[min, max]`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn is_in_target_range(
        &self,
        entity: EntityId,
        position: Vec2Fixed,
        target: EntityId,
        target_position: Vec2Fixed,
        min: Fixed,
        max: Fixed,
        opposite: bool,
    ) -> bool {
        are_shapes_in_range(
            &self.range_shape(entity, position),
            &self.range_shape(target, target_position),
            min,
            max,
            opposite,
        )
    }

    // ------------------------------------------------------------------
    // Rasterization
    // ------------------------------------------------------------------

    /// Stamp shapes onto `grid` for every class with an obstruction policy.
    ///
    /// With `full_update` every shape is stamped; otherwise only shapes
    /// recorded as dirty since the last call.
    pub fn rasterize(&mut self, grid: &mut NavcellGrid, classes: &PassabilityClasses, full_update: bool) {
        // Classes sharing a flag and a clearance are stamped together.
        let mut groups: BTreeMap<(u8, Fixed), PassClassMask> = BTreeMap::new();
        for class in classes.iter() {
            let key = match class.def.obstructions {
                ObstructionPolicy::None => continue,
                ObstructionPolicy::Pathfinding => {
                    (ObstructionFlags::BLOCK_PATHFINDING.0, class.clearance())
                }
                ObstructionPolicy::Foundation => (ObstructionFlags::BLOCK_FOUNDATION.0, Fixed::ZERO),
            };
            *groups.entry(key).or_default() |= class.mask;
        }

        let (w, h) = (grid.width(), grid.height());
        let statics: Vec<u32> = if full_update {
            (0..self.static_shapes.len() as u32).collect()
        } else {
            self.dirty_static.iter().copied().collect()
        };
        for index in statics {
            let Some(shape) = &self.static_shapes[index as usize] else {
                continue;
            };
            for (&(flag, clearance), &mask) in &groups {
                if shape.flags.intersects(ObstructionFlags(flag)) {
                    let spans = rasterize_rect_with_clearance(
                        shape.center,
                        shape.u,
                        shape.v,
                        shape.half(),
                        clearance,
                        w,
                        h,
                    );
                    stamp_spans(grid, &spans, mask);
                }
            }
        }

        let units: Vec<u32> = if full_update {
            (0..self.unit_shapes.len() as u32).collect()
        } else {
            self.dirty_unit.iter().copied().collect()
        };
        for index in units {
            let Some(shape) = &self.unit_shapes[index as usize] else {
                continue;
            };
            for (&(flag, clearance), &mask) in &groups {
                if shape.flags.intersects(ObstructionFlags(flag)) {
                    let spans =
                        rasterize_circle_with_clearance(shape.center, shape.clearance, clearance, w, h);
                    stamp_spans(grid, &spans, mask);
                }
            }
        }

        self.dirty_static.clear();
        self.dirty_unit.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{is_passable, Grid};
    use crate::math::FRAC_PI_2;
    use crate::passability::PassabilityConfig;
    use proptest::prelude::*;

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

    fn manager() -> ObstructionManager {
        ObstructionManager::new(128, 128)
    }

    fn add_building(m: &mut ObstructionManager, entity: EntityId, at: Vec2Fixed, w: i32, h: i32) -> ShapeTag {
        m.add_static_shape(entity, at, Fixed::ZERO, fixed(w), fixed(h), BLOCKING, entity, INVALID_ENTITY)
    }

    #[test]
    fn test_static_round_trip() {
        let mut m = manager();
        let tag = m.add_static_shape(
            5,
            vec2(40, 30),
            FRAC_PI_2,
            fixed(6),
            fixed(4),
            BLOCKING,
            INVALID_ENTITY,
            INVALID_ENTITY,
        );
        let (u, v) = axes_from_angle(FRAC_PI_2);
        let square = m.get_obstruction(tag).expect("live shape");
        assert_eq!(square.center, vec2(40, 30));
        assert_eq!((square.u, square.v), (u, v));
        assert_eq!((square.hw, square.hh), (fixed(3), fixed(2)));
        assert_eq!(square.entity, 5);
        assert_eq!(m.static_shape(tag).map(|s| s.group), Some(5));
        assert_eq!(m.shape_of_entity(5), Some(tag));

        m.remove_shape(tag).expect("removable");
        assert!(m.get_obstruction(tag).is_none());
        assert!(m.shape_of_entity(5).is_none());
        assert!(matches!(m.remove_shape(tag), Err(NavError::UnknownTag(_))));

        let next = add_building(&mut m, 6, vec2(10, 10), 2, 2);
        assert_ne!(next, tag);
    }

    #[test]
    fn test_touching_squares_collide() {
        let mut m = manager();
        add_building(&mut m, 1, vec2(20, 20), 4, 4);
        let filter = ObstructionFilter::Null;
        // Edge-adjacent on the right side.
        assert!(m.test_static_shape(&filter, vec2(24, 20), Fixed::ZERO, fixed(4), fixed(4), None));
        let nudged = Vec2Fixed::new(fixed(24) + Fixed::from_bits(1), fixed(20));
        assert!(!m.test_static_shape(&filter, nudged, Fixed::ZERO, fixed(4), fixed(4), None));
    }

    #[test]
    fn test_unit_against_static_and_unit() {
        let mut m = manager();
        add_building(&mut m, 1, vec2(20, 20), 4, 4);
        m.add_unit_shape(2, vec2(30, 20), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);
        let filter = ObstructionFilter::Null;

        assert!(m.test_unit_shape(&filter, vec2(23, 20), fixed(1), None));
        assert!(!m.test_unit_shape(&filter, Vec2Fixed::new(fixed(23) + Fixed::from_bits(1 << 8), fixed(20)), fixed(1), None));
        assert!(m.test_unit_shape(&filter, vec2(28, 20), fixed(1), None));

        let mut hits = Vec::new();
        assert!(m.test_unit_shape(&filter, vec2(25, 20), fixed(4), Some(&mut hits)));
        assert_eq!(hits, vec![2, 1]);
    }

    #[test]
    fn test_line_is_one_sided() {
        let mut m = manager();
        add_building(&mut m, 1, vec2(20, 20), 4, 4);
        let filter = ObstructionFilter::Null;
        assert!(m.test_line(&filter, vec2(10, 20), vec2(30, 20), Fixed::ZERO));
        assert!(!m.test_line(&filter, vec2(20, 20), vec2(30, 20), Fixed::ZERO));
        assert!(!m.test_line(&filter, vec2(10, 10), vec2(30, 10), Fixed::ONE));
        assert!(m.test_line(&filter, vec2(10, 17), vec2(30, 17), Fixed::ONE));
    }

    #[test]
    fn test_control_group_filter_ignores_own_group() {
        let mut m = manager();
        let tag = m.add_unit_shape(2, vec2(30, 20), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, 9);
        let own = ObstructionFilter::ControlGroupMovement { avoid_moving: false, group: 9 };
        let other = ObstructionFilter::ControlGroupMovement { avoid_moving: false, group: 3 };
        assert!(!m.test_unit_shape(&own, vec2(31, 20), fixed(1), None));
        assert!(m.test_unit_shape(&other, vec2(31, 20), fixed(1), None));

        m.set_unit_moving_flag(tag, true).expect("unit tag");
        assert!(!m.test_unit_shape(&other, vec2(31, 20), fixed(1), None));
    }

    #[test]
    fn test_range_queries_and_on_obstruction() {
        let mut m = manager();
        let building = add_building(&mut m, 1, vec2(20, 20), 8, 8);
        m.add_unit_shape(2, vec2(21, 21), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);
        m.add_unit_shape(3, vec2(60, 60), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);
        add_building(&mut m, 4, vec2(26, 20), 6, 2);

        let all = m.get_obstructions_in_range(&ObstructionFilter::Null, vec2(0, 0), vec2(40, 40));
        let entities: Vec<EntityId> = all.iter().map(|s| s.entity).collect();
        assert_eq!(entities, vec![1, 4, 2]);

        let square = m.get_obstruction(building).expect("live shape");
        assert_eq!(m.get_units_on_obstruction(&square, &ObstructionFilter::Null), vec![2]);
        assert_eq!(
            m.get_static_obstructions_on_obstruction(&square, &ObstructionFilter::Null),
            vec![4]
        );
    }

    #[test]
    fn test_range_shape_distances() {
        let mut m = manager();
        add_building(&mut m, 1, vec2(20, 20), 4, 4);
        assert_eq!(m.distance_to_point(1, Vec2Fixed::ZERO, vec2(30, 20)), fixed(8));
        assert_eq!(m.distance_to_point(99, vec2(0, 0), vec2(3, 4)), fixed(5));
        assert!(m.is_in_point_range(1, Vec2Fixed::ZERO, vec2(30, 20), Fixed::ZERO, fixed(8), false));
        assert!(m.is_in_target_range(1, Vec2Fixed::ZERO, 99, vec2(22, 30), fixed(7), -Fixed::ONE, false));
    }

    #[test]
    fn test_rasterize_per_policy() {
        let mut m = manager();
        let classes = PassabilityClasses::from_config(&PassabilityConfig::default());
        m.set_max_clearance(classes.max_clearance());
        add_building(&mut m, 1, vec2(40, 40), 4, 4);

        let mut grid: NavcellGrid = Grid::new(128, 128);
        m.rasterize(&mut grid, &classes, true);

        let default = classes.mask("default");
        let large = classes.mask("large");
        let building = classes.mask("building-land");
        let unrestricted = classes.mask("unrestricted");

        // Footprint covers centers 38.5..41.5.
        assert!(!is_passable(grid.get(38, 38), building));
        assert!(is_passable(grid.get(37, 40), building));
        // Default class grows by 0.8, the large class by 4.
        assert!(!is_passable(grid.get(37, 40), default));
        assert!(is_passable(grid.get(36, 40), default));
        assert!(!is_passable(grid.get(34, 40), large));
        assert!(is_passable(grid.get(33, 40), large));
        assert!(is_passable(grid.get(40, 40), unrestricted));
    }

    #[test]
    fn test_dirtiness_covers_grown_area_and_neighbours() {
        let mut m = manager();
        m.set_max_clearance(fixed(2));
        let a = add_building(&mut m, 1, vec2(40, 40), 4, 4);
        add_building(&mut m, 2, vec2(46, 40), 2, 2);
        let dirty = m.take_dirtiness();
        assert!(dirty.dirty);
        assert_eq!(dirty.dirty_cells.get(36, 40), 1);
        assert_eq!(dirty.dirty_cells.get(30, 40), 0);
        assert!(!m.dirtiness().dirty);

        let mut grid: NavcellGrid = Grid::new(128, 128);
        let classes = PassabilityClasses::from_config(&PassabilityConfig::default());
        m.rasterize(&mut grid, &classes, false);
        grid.reset();

        // Moving the first building re-dirties its neighbour so it is
        // restamped by an incremental update.
        m.move_shape(a, vec2(38, 40), Fixed::ZERO).expect("live shape");
        m.rasterize(&mut grid, &classes, false);
        assert!(!is_passable(grid.get(46, 40), classes.mask("building-land")));
        assert!(!is_passable(grid.get(38, 40), classes.mask("building-land")));
    }

    #[test]
    fn test_moving_units_do_not_dirty_the_grid() {
        let mut m = manager();
        let tag = m.add_unit_shape(2, vec2(30, 20), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);
        m.move_shape(tag, vec2(31, 20), Fixed::ZERO).expect("live shape");
        assert!(!m.dirtiness().dirty);
        assert_eq!(m.unit_shape(tag).map(|s| s.center), Some(vec2(31, 20)));
    }

    #[test]
    fn test_state_round_trip_rebuilds_index() {
        let mut m = manager();
        add_building(&mut m, 1, vec2(20, 20), 4, 4);
        let removed = add_building(&mut m, 2, vec2(60, 60), 4, 4);
        m.remove_shape(removed).expect("live shape");
        m.add_unit_shape(3, vec2(30, 20), fixed(1), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);

        let restored = ObstructionManager::from_state(m.state());
        assert_eq!(restored.state(), m.state());
        assert_eq!(restored.shape_count(), 2);
        assert!(restored.dirtiness().global_recompute);
        assert!(restored.test_unit_shape(&ObstructionFilter::Null, vec2(22, 20), fixed(1), None));
    }

    proptest! {
        /// Units at exactly the sum of their radii touch and collide; any
        /// further separation along x does not.
        #[test]
        fn prop_unit_touching_is_symmetric(
            x in 10i32..100,
            y in 10i32..100,
            r0 in 1i32..5,
            r1 in 1i32..5,
        ) {
            let mut m = manager();
            m.add_unit_shape(1, vec2(x, y), fixed(r0), ObstructionFlags::BLOCK_MOVEMENT, INVALID_ENTITY);
            let touching = vec2(x + r0 + r1, y);
            prop_assert!(m.test_unit_shape(&ObstructionFilter::Null, touching, fixed(r1), None));
            let apart = Vec2Fixed::new(touching.x + Fixed::from_bits(1 << 12), touching.y);
            prop_assert!(!m.test_unit_shape(&ObstructionFilter::Null, apart, fixed(r1), None));
        }

        /// Axis-aligned squares sharing an edge collide from either side.
        #[test]
        fn prop_square_touching_is_symmetric(
            x in 20i32..100,
            y in 20i32..100,
            w0 in 1i32..8,
            w1 in 1i32..8,
        ) {
            let mut m = manager();
            let a = Vec2Fixed::new(fixed(x), fixed(y));
            m.add_static_shape(1, a, Fixed::ZERO, fixed(2 * w0), fixed(2 * w0), BLOCKING, 1, INVALID_ENTITY);
            let b = Vec2Fixed::new(fixed(x - w0 - w1), fixed(y));
            prop_assert!(m.test_static_shape(&ObstructionFilter::Null, b, Fixed::ZERO, fixed(2 * w1), fixed(2 * w1), None));
            let apart = Vec2Fixed::new(b.x - Fixed::from_bits(1), b.y);
            prop_assert!(!m.test_static_shape(&ObstructionFilter::Null, apart, Fixed::ZERO, fixed(2 * w1), fixed(2 * w1), None));
        }
    }
}
