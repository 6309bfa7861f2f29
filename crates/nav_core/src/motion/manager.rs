//! Registry of unit motions and the per-turn driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::pushing::compute_pushes;
use super::unit::{MoveState, UnitMotion};
use super::{MotionContext, MotionUpdate, MoveRequest, UNIT_OBSTRUCTION_FLAGS};
use crate::components::{EntityId, MotionTemplate, INVALID_ENTITY};
use crate::error::{NavError, Result};
use crate::grid::{PassClassMask, NAVCELL_SIZE};
use crate::math::{Fixed, Vec2Fixed};
use crate::path::PathResultMessage;

/// All unit motions, processed in ascending entity id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionManager {
    units: BTreeMap<EntityId, UnitMotion>,
}

impl MotionManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Give an entity a motion from its template. The entity must already
    /// have a position. Non-controller units get a unit obstruction.
    pub fn add_unit(&mut self, entity: EntityId, template: &MotionTemplate, ctx: &mut MotionContext) -> Result<()> {
        let position = ctx
            .positions
            .get(entity)
            .copied()
            .ok_or(NavError::EntityNotFound(entity))?;
        let pass_class = ctx.pathfinder.pass_class(&template.pass_class);
        let clearance = ctx.pathfinder.clearance(pass_class);

        if self.units.contains_key(&entity) {
            warn!(entity, "Unit motion added twice, replacing");
            self.remove_unit(entity, ctx)?;
        }
        let shape = (!template.formation_controller).then(|| {
            ctx.obstructions
                .add_unit_shape(entity, position.value, clearance, UNIT_OBSTRUCTION_FLAGS, entity)
        });
        self.units
            .insert(entity, UnitMotion::new(entity, template, pass_class, clearance, shape));
        debug!(entity, pass_class, %clearance, "unit motion added");
        Ok(())
    }

    /// Remove an entity's motion and its obstruction.
    pub fn remove_unit(&mut self, entity: EntityId, ctx: &mut MotionContext) -> Result<()> {
        let unit = self.units.remove(&entity).ok_or(NavError::EntityNotFound(entity))?;
        if let Some(tag) = unit.shape() {
            ctx.obstructions.remove_shape(tag)?;
        }
        Ok(())
    }

    /// Motion of one entity.
    #[must_use]
    pub fn unit(&self, entity: EntityId) -> Option<&UnitMotion> {
        self.units.get(&entity)
    }

    /// All motions in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = &UnitMotion> {
        self.units.values()
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Move so the unit's footprint is within `[min_range, max_range]` of
    /// `point`. Returns false if the unit cannot move.
    pub fn move_to_point_range(
        &mut self,
        entity: EntityId,
        point: Vec2Fixed,
        min_range: Fixed,
        max_range: Fixed,
        ctx: &mut MotionContext,
    ) -> bool {
        let request = MoveRequest::Point {
            position: point,
            min_range,
            max_range,
        };
        self.units
            .get_mut(&entity)
            .is_some_and(|unit| unit.begin_move(request, true, ctx))
    }

    /// Move within `[min_range, max_range]` of another entity. Returns false
    /// if the unit cannot move or the target is not in the world.
    pub fn move_to_target_range(
        &mut self,
        entity: EntityId,
        target: EntityId,
        min_range: Fixed,
        max_range: Fixed,
        ctx: &mut MotionContext,
    ) -> bool {
        if ctx.positions.position(target).is_none() {
            return false;
        }
        let request = MoveRequest::Target {
            entity: target,
            min_range,
            max_range,
        };
        self.units
            .get_mut(&entity)
            .is_some_and(|unit| unit.begin_move(request, true, ctx))
    }

    /// Hold `offset` relative to a formation controller, in the
    /// controller's frame.
    pub fn move_to_formation_offset(
        &mut self,
        entity: EntityId,
        controller: EntityId,
        offset: Vec2Fixed,
        ctx: &mut MotionContext,
    ) -> bool {
        if ctx.positions.position(controller).is_none() {
            return false;
        }
        let request = MoveRequest::Offset {
            entity: controller,
            offset,
        };
        self.units
            .get_mut(&entity)
            .is_some_and(|unit| unit.begin_move(request, false, ctx))
    }

    /// Cancel the move order.
    pub fn stop_moving(&mut self, entity: EntityId, ctx: &mut MotionContext) {
        let Some(unit) = self.units.get_mut(&entity) else {
            return;
        };
        unit.stop();
        if let Some(tag) = unit.shape() {
            if let Err(e) = ctx.obstructions.set_unit_moving_flag(tag, false) {
                warn!(entity, "Failed to clear moving flag: {e}");
            }
        }
    }

    /// Turn to face `point` immediately.
    pub fn face_towards_point(&mut self, entity: EntityId, point: Vec2Fixed, ctx: &mut MotionContext) {
        let Some(pos) = ctx.positions.position(entity) else {
            return;
        };
        if pos != point {
            ctx.positions.set_rotation(entity, (point - pos).heading());
        }
    }

    /// Set the heading directly.
    pub fn set_facing(&mut self, entity: EntityId, angle: Fixed, ctx: &mut MotionContext) {
        ctx.positions.set_rotation(entity, angle);
    }

    /// Scale the walking speed, up to the run multiplier.
    pub fn set_speed_multiplier(&mut self, entity: EntityId, multiplier: Fixed) {
        if let Some(unit) = self.units.get_mut(&entity) {
            unit.set_speed_multiplier(multiplier);
        }
    }

    /// Enable or disable pushing for a unit.
    pub fn set_pushing(&mut self, entity: EntityId, pushing: bool) {
        if let Some(unit) = self.units.get_mut(&entity) {
            unit.set_pushing(pushing);
        }
    }

    /// Join a formation (`INVALID_ENTITY` leaves it). Members share the
    /// controller's control group so they never block each other.
    pub fn set_member_of_formation(&mut self, entity: EntityId, controller: EntityId, ctx: &mut MotionContext) {
        let Some(unit) = self.units.get_mut(&entity) else {
            return;
        };
        unit.set_formation_controller(controller);
        if let Some(tag) = unit.shape() {
            let group = if controller == INVALID_ENTITY { entity } else { controller };
            if let Err(e) = ctx.obstructions.set_unit_control_group(tag, group) {
                warn!(entity, "Failed to set formation control group: {e}");
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether the entity has an active move order.
    #[must_use]
    pub fn is_move_requested(&self, entity: EntityId) -> bool {
        self.units.get(&entity).is_some_and(UnitMotion::is_move_requested)
    }

    /// Speed achieved over the last turn.
    #[must_use]
    pub fn current_speed(&self, entity: EntityId) -> Option<Fixed> {
        self.units.get(&entity).map(UnitMotion::current_speed)
    }

    /// Walk speed times the speed multiplier.
    #[must_use]
    pub fn speed(&self, entity: EntityId) -> Option<Fixed> {
        self.units.get(&entity).map(UnitMotion::speed)
    }

    /// Template walk speed.
    #[must_use]
    pub fn walk_speed(&self, entity: EntityId) -> Option<Fixed> {
        self.units.get(&entity).map(UnitMotion::walk_speed)
    }

    /// Template run multiplier.
    #[must_use]
    pub fn run_multiplier(&self, entity: EntityId) -> Option<Fixed> {
        self.units.get(&entity).map(UnitMotion::run_multiplier)
    }

    /// Clearance of the unit's class.
    #[must_use]
    pub fn clearance(&self, entity: EntityId) -> Option<Fixed> {
        self.units.get(&entity).map(UnitMotion::clearance)
    }

    /// Passability class of the unit.
    #[must_use]
    pub fn pass_class(&self, entity: EntityId) -> Option<PassClassMask> {
        self.units.get(&entity).map(UnitMotion::pass_class)
    }

    /// Whether the range around `target` lies in a region the unit can
    /// reach.
    #[must_use]
    pub fn is_target_range_reachable(
        &self,
        entity: EntityId,
        target: EntityId,
        min_range: Fixed,
        max_range: Fixed,
        ctx: &MotionContext,
    ) -> bool {
        self.units
            .get(&entity)
            .is_some_and(|unit| unit.is_target_range_reachable(target, min_range, max_range, ctx))
    }

    // ------------------------------------------------------------------
    // Turn
    // ------------------------------------------------------------------

    /// Hand computed paths to their requesters.
    pub fn handle_path_results(&mut self, results: &[PathResultMessage], ctx: &mut MotionContext) {
        for result in results {
            match self.units.get_mut(&result.notify) {
                Some(unit) => unit.handle_path_result(result, ctx),
                None => trace!(entity = result.notify, ticket = result.ticket, "path result for removed unit"),
            }
        }
    }

    /// Run one turn of `turn_length` seconds for every unit.
    pub fn update(&mut self, turn_length: Fixed, ctx: &mut MotionContext) -> Vec<MotionUpdate> {
        let mut events = Vec::new();
        let mut states: Vec<MoveState> = Vec::with_capacity(self.units.len());

        for (&entity, unit) in &mut self.units {
            let Some(p) = ctx.positions.get(entity).filter(|p| p.in_world).copied() else {
                continue;
            };
            let mut state = MoveState::new(entity, p.value, p.rotation, unit.clearance(), unit.is_pushing());
            if unit.pre_move(&mut state, ctx, &mut events) {
                unit.perform_move(turn_length, &mut state, ctx);
            }
            states.push(state);
        }

        let width = Fixed::from_num(ctx.obstructions.width()) * NAVCELL_SIZE;
        let height = Fixed::from_num(ctx.obstructions.height()) * NAVCELL_SIZE;
        compute_pushes(&mut states, width, height);

        for state in &mut states {
            if let Some(unit) = self.units.get_mut(&state.entity) {
                unit.apply_push(state, ctx);
                unit.post_move(state, turn_length, ctx, &mut events);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Position;
    use crate::goal::PathGoal;
    use crate::motion::{MotionUpdateKind, PositionTable};
    use crate::obstruction::{ObstructionFlags, ObstructionManager};
    use crate::passability::PassabilityConfig;
    use crate::path::PathKind;
    use crate::pathfinder::{Pathfinder, PathfinderConfig};
    use crate::terrain::HeightmapTerrain;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    /// Turn length used by the tests (0.2 s).
    fn turn() -> Fixed {
        Fixed::ONE / 5
    }

    const WALL: ObstructionFlags = ObstructionFlags(
        ObstructionFlags::BLOCK_MOVEMENT.0
            | ObstructionFlags::BLOCK_PATHFINDING.0
            | ObstructionFlags::BLOCK_FOUNDATION.0,
    );

    macro_rules! ctx {
        ($world:expr) => {
            MotionContext {
                pathfinder: &mut $world.pathfinder,
                obstructions: &mut $world.obstructions,
                positions: &mut $world.positions,
            }
        };
    }

    struct World {
        pathfinder: Pathfinder,
        obstructions: ObstructionManager,
        positions: PositionTable,
        motion: MotionManager,
    }

    impl World {
        /// Flat 96x96 navcell map.
        fn new() -> Self {
            let mut pathfinder = Pathfinder::new(
                PathfinderConfig {
                    workers: 1,
                    ..PathfinderConfig::default()
                },
                &PassabilityConfig::default(),
            );
            let mut obstructions = ObstructionManager::new(96, 96);
            pathfinder.load_terrain(&HeightmapTerrain::flat(24), &mut obstructions);
            pathfinder.update_grid(&mut obstructions);
            Self {
                pathfinder,
                obstructions,
                positions: PositionTable::new(),
                motion: MotionManager::new(),
            }
        }

        fn spawn(&mut self, entity: EntityId, at: Vec2Fixed) {
            self.positions.insert(entity, Position::new(at));
            let template = MotionTemplate::new(fixed(9), "default");
            let mut ctx = ctx!(self);
            self.motion.add_unit(entity, &template, &mut ctx).expect("unit has a position");
        }

        fn wall(&mut self, entity: EntityId, at: Vec2Fixed, w: i32, h: i32) {
            self.obstructions
                .add_static_shape(entity, at, Fixed::ZERO, fixed(w), fixed(h), WALL, entity, INVALID_ENTITY);
            self.pathfinder.update_grid(&mut self.obstructions);
        }

        /// One full turn in the same order as the simulation.
        fn tick(&mut self) -> Vec<MotionUpdate> {
            let results = self.pathfinder.fetch_async_results();
            let mut ctx = ctx!(self);
            self.motion.handle_path_results(&results, &mut ctx);
            let events = self.motion.update(turn(), &mut ctx);
            self.pathfinder.update_grid(&mut self.obstructions);
            self.pathfinder.start_processing_moves(&self.obstructions);
            events
        }

        fn pos(&self, entity: EntityId) -> Vec2Fixed {
            self.positions.position(entity).expect("in world")
        }
    }

    fn has(events: &[MotionUpdate], entity: EntityId, kind: MotionUpdateKind) -> bool {
        events.iter().any(|e| e.entity == entity && e.kind == kind)
    }

    #[test]
    fn test_add_unit_requires_position() {
        let mut world = World::new();
        let template = MotionTemplate::new(fixed(9), "default");
        let mut ctx = ctx!(world);
        assert!(matches!(
            world.motion.add_unit(5, &template, &mut ctx),
            Err(NavError::EntityNotFound(5))
        ));
        world.spawn(5, vec2(20, 20));
        let unit = world.motion.unit(5).expect("added");
        assert_eq!(unit.pass_class(), world.pathfinder.pass_class("default"));
        assert!(unit.shape().is_some());
        assert!(world.obstructions.shape_of_entity(5).is_some());
    }

    #[test]
    fn test_clear_line_needs_no_path_request() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        assert!(world.motion.move_to_point_range(1, vec2(40, 20), Fixed::ZERO, Fixed::ZERO, &mut ctx));
        assert_eq!(world.pathfinder.pending_request_count(), 0);
        let unit = world.motion.unit(1).expect("unit");
        assert_eq!(unit.long_path().as_end_first(), &[vec2(40, 20)]);
        assert!(unit.expected_ticket().is_none());
    }

    #[test]
    fn test_unit_walks_to_point_and_reports_success() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(40, 20), Fixed::ZERO, Fixed::ZERO, &mut ctx);

        let mut succeeded = false;
        for _ in 0..40 {
            let events = world.tick();
            if has(&events, 1, MotionUpdateKind::LikelySuccess) {
                succeeded = true;
                break;
            }
        }
        assert!(succeeded);
        assert!(world.pos(1).distance(vec2(40, 20)) <= world.motion.clearance(1).expect("unit"));
        // Facing the destination (+x).
        let rotation = world.positions.get(1).expect("entry").rotation;
        assert!((rotation - crate::math::FRAC_PI_2).abs() < Fixed::from_num(0.05));
    }

    #[test]
    fn test_success_repeats_until_stopped() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(24, 20), Fixed::ZERO, Fixed::ZERO, &mut ctx);

        let mut successes = 0;
        for _ in 0..40 {
            if has(&world.tick(), 1, MotionUpdateKind::LikelySuccess) {
                successes += 1;
            } else {
                assert_eq!(successes, 0, "success stopped before the host did");
            }
        }
        assert!(successes > 1);

        let mut ctx = ctx!(world);
        world.motion.stop_moving(1, &mut ctx);
        assert!(!has(&world.tick(), 1, MotionUpdateKind::LikelySuccess));
    }

    #[test]
    fn test_speed_and_turn_rate_limit_movement() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(20, 50), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        world.tick();
        // Already facing +y: a full turn at 9 units/s.
        assert_eq!(world.pos(1), Vec2Fixed::new(fixed(20), fixed(20) + fixed(9) * turn()));
        let speed = world.motion.current_speed(1).expect("unit");
        assert!((speed - fixed(9)).abs() < Fixed::from_num(0.01));

        // A reversal costs turning time first.
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(20, 10), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        let before = world.pos(1);
        world.tick();
        assert!(before.distance(world.pos(1)) < fixed(9) * turn());
    }

    #[test]
    fn test_far_goal_uses_long_path() {
        let mut world = World::new();
        world.spawn(1, vec2(10, 10));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(85, 85), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        let expected = world.motion.unit(1).and_then(UnitMotion::expected_ticket).expect("waiting");
        assert_eq!(expected.kind, PathKind::Long);
        assert_eq!(world.pathfinder.pending_request_count(), 1);

        world.tick();
        world.tick();
        let unit = world.motion.unit(1).expect("unit");
        assert!(unit.expected_ticket().is_none());
        assert_eq!(unit.long_path().last(), Some(vec2(85, 85)));
        assert!(world.pos(1) != vec2(10, 10));
    }

    #[test]
    fn test_stale_result_is_ignored() {
        let mut world = World::new();
        world.spawn(1, vec2(10, 10));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(85, 85), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        // Re-ordering supersedes the first ticket.
        world.motion.move_to_point_range(1, vec2(85, 10), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        world.pathfinder.start_processing_moves(&world.obstructions);
        let results = world.pathfinder.fetch_async_results();
        assert_eq!(results.len(), 2);
        let mut ctx = ctx!(world);
        world.motion.handle_path_results(&results, &mut ctx);
        let unit = world.motion.unit(1).expect("unit");
        assert_eq!(unit.long_path().last(), Some(vec2(85, 10)));
    }

    #[test]
    fn test_walks_around_wall() {
        let mut world = World::new();
        world.wall(100, vec2(48, 40), 4, 50);
        world.spawn(1, vec2(30, 40));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(66, 40), Fixed::ZERO, Fixed::ONE, &mut ctx);

        let mut succeeded = false;
        for _ in 0..150 {
            if has(&world.tick(), 1, MotionUpdateKind::LikelySuccess) {
                succeeded = true;
                break;
            }
        }
        assert!(succeeded);
        assert!(world.pos(1).x > fixed(60));
    }

    #[test]
    fn test_vanished_target_fails() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        world.spawn(2, vec2(30, 20));
        let mut ctx = ctx!(world);
        assert!(world.motion.move_to_target_range(1, 2, Fixed::ZERO, fixed(2), &mut ctx));
        world.positions.move_out_of_world(2);
        let events = world.tick();
        assert!(has(&events, 1, MotionUpdateKind::LikelyFailure));
        assert!(world.motion.unit(1).expect("unit").long_path().is_empty());

        let mut ctx = ctx!(world);
        assert!(!world.motion.move_to_target_range(1, 2, Fixed::ZERO, fixed(2), &mut ctx));
    }

    #[test]
    fn test_follows_moving_target() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        world.spawn(2, vec2(30, 20));
        world.motion.set_pushing(1, false);
        world.motion.set_pushing(2, false);
        let mut ctx = ctx!(world);
        world.motion.move_to_target_range(1, 2, Fixed::ZERO, fixed(2), &mut ctx);
        world.motion.move_to_point_range(2, vec2(30, 60), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        for _ in 0..60 {
            world.tick();
        }
        let target = world.pos(2);
        assert!(target.distance(vec2(30, 60)) <= world.motion.clearance(2).expect("unit"));
        let range = world.motion.clearance(1).expect("unit") * 2 + fixed(2) + Fixed::ONE;
        assert!(world.pos(1).distance(target) <= range);
    }

    #[test]
    fn test_formation_offset_uses_controller_frame() {
        let mut world = World::new();
        world.positions.insert(50, Position::new(vec2(40, 40)));
        world.positions.set_rotation(50, crate::math::FRAC_PI_2);
        let controller = MotionTemplate {
            formation_controller: true,
            ..MotionTemplate::new(fixed(9), "default")
        };
        let mut ctx = ctx!(world);
        world.motion.add_unit(50, &controller, &mut ctx).expect("controller");
        assert!(world.obstructions.shape_of_entity(50).is_none());

        world.spawn(1, vec2(30, 30));
        let mut ctx = ctx!(world);
        world.motion.set_member_of_formation(1, 50, &mut ctx);
        // Controller faces +x, so "3 ahead" is +x.
        assert!(world.motion.move_to_formation_offset(1, 50, vec2(0, 3), &mut ctx));
        for _ in 0..20 {
            world.tick();
        }
        assert!(world.pos(1).distance(vec2(43, 40)) < Fixed::ONE);
        let tag = world.obstructions.shape_of_entity(1).expect("shape");
        assert_eq!(world.obstructions.unit_shape(tag).map(|s| s.group), Some(50));
    }

    #[test]
    fn test_pushing_separates_idle_units() {
        let mut world = World::new();
        world.spawn(1, vec2(30, 30));
        world.spawn(2, vec2(30, 30));
        for _ in 0..10 {
            world.tick();
        }
        let gap = world.pos(1).distance(world.pos(2));
        assert!(gap > Fixed::ONE);
        assert!(world.motion.unit(1).expect("unit").push_pressure() > Fixed::ZERO);
    }

    #[test]
    fn test_enclosed_goal_reports_failure() {
        let mut world = World::new();
        // Box around (70, 70).
        world.wall(100, vec2(70, 62), 20, 2);
        world.wall(101, vec2(70, 78), 20, 2);
        world.wall(102, vec2(62, 70), 2, 20);
        world.wall(103, vec2(78, 70), 2, 20);
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(70, 70), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        let goal = PathGoal::point(vec2(70, 70));
        assert!(!world.pathfinder.is_goal_reachable(vec2(20, 20), &goal, world.pathfinder.pass_class("default")));

        let mut failed = false;
        for _ in 0..200 {
            if has(&world.tick(), 1, MotionUpdateKind::LikelyFailure) {
                failed = true;
                break;
            }
        }
        assert!(failed);
        // Ends next to the box, outside it.
        let p = world.pos(1);
        assert!(p.distance(vec2(70, 70)) < fixed(16));
        let inside = p.x > fixed(61) && p.x < fixed(79) && p.y > fixed(61) && p.y < fixed(79);
        assert!(!inside);
    }

    #[test]
    fn test_speed_multiplier_is_capped() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        world.motion.set_speed_multiplier(1, fixed(3));
        assert_eq!(world.motion.speed(1), Some(fixed(9)));
        world.motion.set_speed_multiplier(1, Fixed::ONE / 2);
        assert_eq!(world.motion.speed(1), Some(Fixed::from_num(4.5)));
        assert_eq!(world.motion.walk_speed(1), Some(fixed(9)));
        assert_eq!(world.motion.run_multiplier(1), Some(Fixed::ONE));
    }

    #[test]
    fn test_stop_moving_clears_state() {
        let mut world = World::new();
        world.spawn(1, vec2(20, 20));
        let mut ctx = ctx!(world);
        world.motion.move_to_point_range(1, vec2(80, 80), Fixed::ZERO, Fixed::ZERO, &mut ctx);
        assert!(world.motion.is_move_requested(1));
        world.motion.stop_moving(1, &mut ctx);
        assert!(!world.motion.is_move_requested(1));
        // The pending result arrives and is dropped.
        world.tick();
        world.tick();
        assert_eq!(world.pos(1), vec2(20, 20));
    }

    #[test]
    fn test_target_range_reachability() {
        let mut world = World::new();
        world.wall(100, vec2(48, 48), 2, 96);
        world.spawn(1, vec2(20, 20));
        world.spawn(2, vec2(30, 30));
        world.spawn(3, vec2(70, 30));
        let ctx = ctx!(world);
        assert!(world.motion.is_target_range_reachable(1, 2, Fixed::ZERO, fixed(2), &ctx));
        assert!(!world.motion.is_target_range_reachable(1, 3, Fixed::ZERO, fixed(2), &ctx));
    }
}
