//! Movement state machine of a single unit.
//!
//! A unit is in one of three situations:
//!
//! - no move requested,
//! - waiting for a path (`expected_ticket` is set and both paths are empty),
//! - following its short path, then its long path, possibly with a
//!   recomputation in flight.
//!
//! Waypoints are consumed from the short path first. The short path only
//! ever leads around local obstacles towards the next long waypoint.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::request::{ExpectedTicket, MoveRequest};
use super::{
    MotionContext, MotionUpdate, MotionUpdateKind, ALTERNATE_PATH_TYPE_DELAY, ALTERNATE_PATH_TYPE_EVERY,
    BACKUP_HACK_DELAY, CHECK_TARGET_MOVEMENT_MIN_DELTA, DIRECT_PATH_RANGE, FREE_ROTATION,
    KNOWN_IMPERFECT_PATH_RESET_COUNTDOWN, LONG_PATH_MIN_DIST, MAX_FAILED_MOVEMENTS, PUSHING_MAX_PRESSURE,
    SHORT_PATH_GOAL_RADIUS, SHORT_PATH_MAX_SEARCH_RANGE, SHORT_PATH_MIN_SEARCH_RANGE,
    SHORT_PATH_SEARCH_RANGE_INCREMENT,
};
use crate::components::{EntityId, MotionTemplate, INVALID_ENTITY};
use crate::goal::PathGoal;
use crate::grid::PassClassMask;
use crate::math::{fixed_serde, wrap_angle, Fixed, Vec2Fixed};
use crate::obstruction::{ObstructionFilter, RangeShape, ShapeTag};
use crate::path::{PathKind, PathResultMessage, ShortPathRequest, WaypointPath};

/// Range goals are shrunk by this much so that arriving on the goal edge
/// is inside the requested range.
const GOAL_MARGIN: Fixed = Fixed::from_bits(1 << 30);

/// Distance at which a formation member counts as in place.
const OFFSET_ARRIVAL_DISTANCE: Fixed = Fixed::from_bits(1 << 31);

/// Per-turn scratch state of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MoveState {
    pub entity: EntityId,
    pub initial: Vec2Fixed,
    pub pos: Vec2Fixed,
    pub angle: Fixed,
    pub clearance: Fixed,
    /// Whether the unit tried to walk this turn.
    pub moving: bool,
    /// Whether the unit takes part in pushing.
    pub pushing: bool,
    pub was_obstructed: bool,
    /// Displacement requested by pushing.
    pub push: Vec2Fixed,
    /// Overlap accumulated by pushing this turn.
    pub pressure: Fixed,
}

impl MoveState {
    pub(crate) fn new(entity: EntityId, pos: Vec2Fixed, angle: Fixed, clearance: Fixed, pushing: bool) -> Self {
        Self {
            entity,
            initial: pos,
            pos,
            angle,
            clearance,
            moving: false,
            pushing,
            was_obstructed: false,
            push: Vec2Fixed::ZERO,
            pressure: Fixed::ZERO,
        }
    }
}

/// Movement state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitMotion {
    entity: EntityId,
    #[serde(with = "fixed_serde")]
    walk_speed: Fixed,
    #[serde(with = "fixed_serde")]
    run_multiplier: Fixed,
    #[serde(with = "fixed_serde")]
    turn_rate: Fixed,
    pass_class_name: String,
    pass_class: PassClassMask,
    #[serde(with = "fixed_serde")]
    clearance: Fixed,
    #[serde(with = "fixed_serde")]
    speed_multiplier: Fixed,
    #[serde(with = "fixed_serde")]
    last_turn_speed: Fixed,
    #[serde(with = "fixed_serde")]
    push_pressure: Fixed,
    shape: Option<ShapeTag>,
    is_formation_controller: bool,
    formation_controller: EntityId,
    pushing: bool,
    move_request: MoveRequest,
    expected_ticket: Option<ExpectedTicket>,
    long_path: WaypointPath,
    short_path: WaypointPath,
    path_goal: Option<PathGoal>,
    failed_movements: u8,
    known_imperfect_countdown: u8,
    face_point_after_move: bool,
}

impl UnitMotion {
    pub(crate) fn new(
        entity: EntityId,
        template: &MotionTemplate,
        pass_class: PassClassMask,
        clearance: Fixed,
        shape: Option<ShapeTag>,
    ) -> Self {
        Self {
            entity,
            walk_speed: template.walk_speed,
            run_multiplier: template.run_multiplier,
            turn_rate: template.turn_rate,
            pass_class_name: template.pass_class.clone(),
            pass_class,
            clearance,
            speed_multiplier: Fixed::ONE,
            last_turn_speed: Fixed::ZERO,
            push_pressure: Fixed::ZERO,
            shape,
            is_formation_controller: template.formation_controller,
            formation_controller: INVALID_ENTITY,
            pushing: !template.formation_controller,
            move_request: MoveRequest::None,
            expected_ticket: None,
            long_path: WaypointPath::new(),
            short_path: WaypointPath::new(),
            path_goal: None,
            failed_movements: 0,
            known_imperfect_countdown: 0,
            face_point_after_move: false,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Owning entity.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Whether a move order is active.
    #[must_use]
    pub fn is_move_requested(&self) -> bool {
        self.move_request.is_some()
    }

    /// The active move order.
    #[must_use]
    pub fn move_request(&self) -> &MoveRequest {
        &self.move_request
    }

    /// Speed the unit would move at now, in world units per second.
    #[must_use]
    pub fn speed(&self) -> Fixed {
        self.walk_speed * self.speed_multiplier
    }

    /// Speed actually achieved over the last turn.
    #[must_use]
    pub fn current_speed(&self) -> Fixed {
        self.last_turn_speed
    }

    /// Template walking speed.
    #[must_use]
    pub fn walk_speed(&self) -> Fixed {
        self.walk_speed
    }

    /// Largest allowed speed multiplier.
    #[must_use]
    pub fn run_multiplier(&self) -> Fixed {
        self.run_multiplier
    }

    /// Current speed multiplier.
    #[must_use]
    pub fn speed_multiplier(&self) -> Fixed {
        self.speed_multiplier
    }

    /// Rotation speed in radians per second.
    #[must_use]
    pub fn turn_rate(&self) -> Fixed {
        self.turn_rate
    }

    /// Clearance of the unit's passability class.
    #[must_use]
    pub fn clearance(&self) -> Fixed {
        self.clearance
    }

    /// Passability class mask.
    #[must_use]
    pub fn pass_class(&self) -> PassClassMask {
        self.pass_class
    }

    /// Passability class name from the template.
    #[must_use]
    pub fn pass_class_name(&self) -> &str {
        &self.pass_class_name
    }

    /// Obstruction shape, if the unit has one.
    #[must_use]
    pub fn shape(&self) -> Option<ShapeTag> {
        self.shape
    }

    /// Whether the unit takes part in pushing.
    #[must_use]
    pub fn is_pushing(&self) -> bool {
        self.pushing
    }

    /// Formation this unit belongs to, or `INVALID_ENTITY`.
    #[must_use]
    pub fn formation_controller(&self) -> EntityId {
        self.formation_controller
    }

    /// Long path still to walk.
    #[must_use]
    pub fn long_path(&self) -> &WaypointPath {
        &self.long_path
    }

    /// Short path still to walk.
    #[must_use]
    pub fn short_path(&self) -> &WaypointPath {
        &self.short_path
    }

    /// Path request the unit waits for.
    #[must_use]
    pub fn expected_ticket(&self) -> Option<ExpectedTicket> {
        self.expected_ticket
    }

    /// Consecutive blocked turns.
    #[must_use]
    pub fn failed_movements(&self) -> u8 {
        self.failed_movements
    }

    /// Pushing pressure carried into the next turn.
    #[must_use]
    pub fn push_pressure(&self) -> Fixed {
        self.push_pressure
    }

    pub(crate) fn control_group(&self) -> EntityId {
        if self.formation_controller == INVALID_ENTITY {
            self.entity
        } else {
            self.formation_controller
        }
    }

    fn movement_filter(&self) -> ObstructionFilter {
        ObstructionFilter::ControlGroupMovement {
            avoid_moving: false,
            group: self.control_group(),
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub(crate) fn set_speed_multiplier(&mut self, multiplier: Fixed) {
        if multiplier > self.run_multiplier {
            warn!(
                entity = self.entity,
                %multiplier,
                "Speed multiplier above the run multiplier, clamping"
            );
        }
        self.speed_multiplier = multiplier.clamp(Fixed::ZERO, self.run_multiplier);
    }

    pub(crate) fn set_pushing(&mut self, pushing: bool) {
        self.pushing = pushing && !self.is_formation_controller;
    }

    pub(crate) fn set_formation_controller(&mut self, controller: EntityId) {
        self.formation_controller = controller;
    }

    fn clear_paths(&mut self) {
        self.long_path.clear();
        self.short_path.clear();
        self.expected_ticket = None;
    }

    pub(crate) fn stop(&mut self) {
        self.move_request = MoveRequest::None;
        self.clear_paths();
        self.path_goal = None;
        self.failed_movements = 0;
        self.known_imperfect_countdown = 0;
    }

    // ------------------------------------------------------------------
    // Goals
    // ------------------------------------------------------------------

    fn grown_goal(shape: RangeShape, by: Fixed, inverted: bool) -> PathGoal {
        match shape {
            RangeShape::Point(center) if by == Fixed::ZERO && !inverted => PathGoal::point(center),
            RangeShape::Point(center) => PathGoal::circle(center, by, inverted),
            RangeShape::Circle { center, radius } => PathGoal::circle(center, radius + by, inverted),
            RangeShape::Square { center, u, v, half } => {
                PathGoal::square(center, u, v, half.x + by, half.y + by, inverted)
            }
        }
    }

    /// Goal for the unit center given the footprint it must get in range of.
    fn range_goal(&self, shape: RangeShape, from: Vec2Fixed, min_range: Fixed, max_range: Fixed) -> PathGoal {
        let distance = shape.distance_to_point(from) - self.clearance;
        if min_range > Fixed::ZERO && distance < min_range {
            return Self::grown_goal(shape, min_range + self.clearance + GOAL_MARGIN, true);
        }
        if max_range == Fixed::ZERO && matches!(shape, RangeShape::Point(_)) {
            return Self::grown_goal(shape, Fixed::ZERO, false);
        }
        let reach = (max_range + self.clearance - GOAL_MARGIN).max(Fixed::ZERO);
        Self::grown_goal(shape, reach, false)
    }

    fn goal_for(&self, request: &MoveRequest, from: Vec2Fixed, predict: bool, ctx: &MotionContext) -> Option<PathGoal> {
        let followed = |entity: EntityId| {
            let p = ctx.positions.get(entity).filter(|p| p.in_world)?;
            let center = if predict { p.value + p.last_motion() } else { p.value };
            Some((center, p.rotation))
        };
        match *request {
            MoveRequest::None => None,
            MoveRequest::Point {
                position,
                min_range,
                max_range,
            } => Some(self.range_goal(RangeShape::Point(position), from, min_range, max_range)),
            MoveRequest::Target {
                entity,
                min_range,
                max_range,
            } => {
                let (center, _) = followed(entity)?;
                let shape = match ctx.obstructions.range_shape(entity, center) {
                    RangeShape::Circle { radius, .. } => RangeShape::Circle { center, radius },
                    other => other,
                };
                Some(self.range_goal(shape, from, min_range, max_range))
            }
            MoveRequest::Offset { entity, offset } => {
                let (center, rotation) = followed(entity)?;
                Some(PathGoal::point(center + offset.rotate(rotation)))
            }
        }
    }

    fn compute_goal(&self, from: Vec2Fixed, predict: bool, ctx: &MotionContext) -> Option<PathGoal> {
        self.goal_for(&self.move_request, from, predict, ctx)
    }

    /// Whether the unit standing at `pos` satisfies its move order.
    pub(crate) fn is_in_range(&self, pos: Vec2Fixed, ctx: &MotionContext) -> bool {
        match self.move_request {
            MoveRequest::None => false,
            MoveRequest::Point {
                position,
                min_range,
                max_range,
            } => ctx
                .obstructions
                .is_in_point_range(self.entity, pos, position, min_range, max_range, false),
            MoveRequest::Target {
                entity,
                min_range,
                max_range,
            } => ctx.positions.position(entity).is_some_and(|target| {
                ctx.obstructions
                    .is_in_target_range(self.entity, pos, entity, target, min_range, max_range, false)
            }),
            MoveRequest::Offset { .. } => self.compute_goal(pos, false, ctx).is_some_and(|goal| {
                (goal.center - pos).length_squared() <= OFFSET_ARRIVAL_DISTANCE * OFFSET_ARRIVAL_DISTANCE
            }),
        }
    }

    pub(crate) fn is_target_range_reachable(
        &self,
        target: EntityId,
        min_range: Fixed,
        max_range: Fixed,
        ctx: &MotionContext,
    ) -> bool {
        let Some(from) = ctx.positions.position(self.entity) else {
            return false;
        };
        let request = MoveRequest::Target {
            entity: target,
            min_range,
            max_range,
        };
        self.goal_for(&request, from, false, ctx)
            .is_some_and(|goal| ctx.pathfinder.is_goal_reachable(from, &goal, self.pass_class))
    }

    // ------------------------------------------------------------------
    // Path requests
    // ------------------------------------------------------------------

    /// Replace the paths with a straight line to the goal when it is near
    /// and nothing blocks the way. Issues no path request.
    fn try_going_straight_to_target(&mut self, from: Vec2Fixed, ctx: &mut MotionContext) -> bool {
        let Some(goal) = self.compute_goal(from, true, ctx) else {
            return false;
        };
        let target = goal.nearest_point_on_goal(from);
        if (target - from).length_squared() > DIRECT_PATH_RANGE * DIRECT_PATH_RANGE {
            return false;
        }
        let clear = ctx.pathfinder.check_movement(
            ctx.obstructions,
            &self.movement_filter(),
            from,
            target,
            self.clearance,
            self.pass_class,
        );
        if !clear {
            return false;
        }
        self.long_path = WaypointPath::from_walk_order(vec![target]);
        self.short_path.clear();
        self.expected_ticket = None;
        self.path_goal = Some(goal);
        true
    }

    fn request_long_path(&mut self, from: Vec2Fixed, goal: PathGoal, ctx: &mut MotionContext) {
        let ticket = ctx
            .pathfinder
            .compute_path_async(from, goal, self.pass_class, self.entity);
        trace!(entity = self.entity, ticket, "waiting for long path");
        self.expected_ticket = Some(ExpectedTicket {
            ticket,
            kind: PathKind::Long,
        });
    }

    fn request_short_path(&mut self, from: Vec2Fixed, goal: PathGoal, range: Fixed, ctx: &mut MotionContext) {
        let ticket = ctx.pathfinder.compute_short_path_async(ShortPathRequest {
            ticket: 0,
            start: from,
            clearance: self.clearance,
            range,
            goal,
            pass_class: self.pass_class,
            avoid_moving_units: false,
            group: self.control_group(),
            notify: self.entity,
        });
        trace!(entity = self.entity, ticket, %range, "waiting for short path");
        self.expected_ticket = Some(ExpectedTicket {
            ticket,
            kind: PathKind::Short,
        });
    }

    /// Start over towards the goal: direct line if possible, otherwise a
    /// short request for near goals and a long one for far goals.
    fn compute_path_to_goal(&mut self, from: Vec2Fixed, ctx: &mut MotionContext) {
        let Some(goal) = self.compute_goal(from, false, ctx) else {
            return;
        };
        self.clear_paths();
        if self.try_going_straight_to_target(from, ctx) {
            return;
        }
        self.path_goal = Some(goal);
        let distance = goal.distance_to_point(from);
        if distance < LONG_PATH_MIN_DIST {
            let range = (distance + SHORT_PATH_MIN_SEARCH_RANGE).min(SHORT_PATH_MAX_SEARCH_RANGE);
            self.request_short_path(from, goal, range, ctx);
        } else {
            self.request_long_path(from, goal, ctx);
        }
    }

    /// Accept a new move order and start pathing. Returns false when the
    /// unit is not in the world.
    pub(crate) fn begin_move(&mut self, request: MoveRequest, face_after: bool, ctx: &mut MotionContext) -> bool {
        let Some(from) = ctx.positions.position(self.entity) else {
            return false;
        };
        self.stop();
        self.move_request = request;
        self.face_point_after_move = face_after;
        self.compute_path_to_goal(from, ctx);
        true
    }

    /// Deliver a path result. Results for any ticket but the expected one
    /// are stale and dropped.
    pub(crate) fn handle_path_result(&mut self, result: &PathResultMessage, ctx: &mut MotionContext) {
        let Some(expected) = self.expected_ticket.filter(|e| e.ticket == result.ticket) else {
            trace!(entity = self.entity, ticket = result.ticket, "stale path result dropped");
            return;
        };
        self.expected_ticket = None;
        if !self.move_request.is_some() {
            return;
        }
        let Some(from) = ctx.positions.position(self.entity) else {
            return;
        };
        let Some(goal) = self.compute_goal(from, false, ctx) else {
            return;
        };

        match expected.kind {
            PathKind::Long => {
                self.short_path.clear();
                self.path_goal = Some(goal);
                match result.path.last() {
                    Some(end) if goal.distance_to_point(end) <= goal.distance_to_point(from) => {
                        self.known_imperfect_countdown = if goal.contains_point(end) {
                            0
                        } else {
                            KNOWN_IMPERFECT_PATH_RESET_COUNTDOWN
                        };
                        self.long_path = result.path.clone();
                    }
                    _ => {
                        // Let the short pathfinder try the goal itself.
                        debug!(entity = self.entity, "Long path failed, falling back to the goal point");
                        self.long_path = WaypointPath::from_walk_order(vec![goal.nearest_point_on_goal(from)]);
                    }
                }
            }
            PathKind::Short => {
                let towards = self
                    .long_path
                    .next()
                    .unwrap_or_else(|| goal.nearest_point_on_goal(from));
                match result.path.last() {
                    Some(end) if end.distance_squared(towards) <= from.distance_squared(towards) => {
                        self.short_path = result.path.clone();
                    }
                    Some(_) => {
                        trace!(entity = self.entity, "short path leads away, rejected");
                    }
                    None if self.long_path.is_empty() => self.request_long_path(from, goal, ctx),
                    None => {}
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Turn phases
    // ------------------------------------------------------------------

    /// Start-of-turn checks. Returns whether the unit should try to move.
    pub(crate) fn pre_move(
        &mut self,
        state: &mut MoveState,
        ctx: &mut MotionContext,
        events: &mut Vec<MotionUpdate>,
    ) -> bool {
        if !self.move_request.is_some() {
            return false;
        }
        if let Some(target) = self.move_request.target() {
            if ctx.positions.position(target).is_none() {
                debug!(entity = self.entity, target, "Move target is gone");
                self.clear_paths();
                events.push(MotionUpdate {
                    entity: self.entity,
                    kind: MotionUpdateKind::LikelyFailure,
                });
                return false;
            }
        }

        if self.is_in_range(state.pos, ctx) {
            self.clear_paths();
            if self.face_point_after_move {
                if let Some(goal) = self.compute_goal(state.pos, false, ctx) {
                    if goal.center != state.pos {
                        state.angle = (goal.center - state.pos).heading();
                    }
                }
            }
            events.push(MotionUpdate {
                entity: self.entity,
                kind: MotionUpdateKind::LikelySuccess,
            });
            return false;
        }

        if self.move_request.target().is_some() && self.expected_ticket.is_none() {
            let moved = match (self.compute_goal(state.pos, false, ctx), self.path_goal) {
                (Some(goal), Some(previous)) => {
                    goal.center.distance_squared(previous.center)
                        > CHECK_TARGET_MOVEMENT_MIN_DELTA * CHECK_TARGET_MOVEMENT_MIN_DELTA
                }
                _ => false,
            };
            if moved {
                if self.known_imperfect_countdown > 0 {
                    self.known_imperfect_countdown -= 1;
                } else {
                    self.compute_path_to_goal(state.pos, ctx);
                }
            }
        }

        if self.long_path.is_empty() && self.short_path.is_empty() && self.expected_ticket.is_none() {
            if self.known_imperfect_countdown > 0 {
                self.known_imperfect_countdown -= 1;
            } else {
                self.compute_path_to_goal(state.pos, ctx);
            }
        }
        true
    }

    fn pop_waypoint(&mut self) {
        if self.short_path.pop_next().is_none() {
            self.long_path.pop_next();
        }
    }

    /// Walk along the paths for `dt` seconds.
    pub(crate) fn perform_move(&mut self, dt: Fixed, state: &mut MoveState, ctx: &mut MotionContext) {
        if self.move_request.target().is_some() {
            self.try_going_straight_to_target(state.pos, ctx);
        }
        if self.short_path.is_empty() && self.long_path.is_empty() {
            return;
        }
        state.moving = true;

        let pressure = self.push_pressure.min(PUSHING_MAX_PRESSURE);
        let speed = self.speed() - self.speed() * pressure / (PUSHING_MAX_PRESSURE * 2);
        if speed <= Fixed::ZERO {
            return;
        }
        let filter = self.movement_filter();
        let mut time_left = dt;

        while time_left > Fixed::ZERO {
            let Some(target) = self.short_path.next().or_else(|| self.long_path.next()) else {
                break;
            };
            let offset = target - state.pos;
            if offset == Vec2Fixed::ZERO {
                self.pop_waypoint();
                continue;
            }

            let heading = offset.heading();
            let diff = wrap_angle(heading - state.angle);
            if diff.abs() > FREE_ROTATION && self.turn_rate > Fixed::ZERO {
                let turn_time = diff.abs() / self.turn_rate;
                if turn_time >= time_left {
                    let step = self.turn_rate * time_left;
                    state.angle = wrap_angle(if diff > Fixed::ZERO {
                        state.angle + step
                    } else {
                        state.angle - step
                    });
                    break;
                }
                time_left -= turn_time;
            }
            state.angle = heading;

            let max_dist = speed * time_left;
            let dist = offset.length();
            let (dest, reached) = if dist <= max_dist {
                (target, true)
            } else {
                (state.pos + offset.normalize_to(max_dist), false)
            };
            let clear = ctx.pathfinder.check_movement(
                ctx.obstructions,
                &filter,
                state.pos,
                dest,
                self.clearance,
                self.pass_class,
            );
            if !clear {
                state.was_obstructed = true;
                break;
            }
            state.pos = dest;
            if !reached {
                break;
            }
            time_left -= dist / speed;
            self.pop_waypoint();
        }
    }

    /// Apply a pushing displacement if the way is clear.
    pub(crate) fn apply_push(&self, state: &mut MoveState, ctx: &MotionContext) {
        if state.push == Vec2Fixed::ZERO {
            return;
        }
        let dest = state.pos + state.push;
        let clear = ctx.pathfinder.check_movement(
            ctx.obstructions,
            &self.movement_filter(),
            state.pos,
            dest,
            self.clearance,
            self.pass_class,
        );
        if clear {
            state.pos = dest;
        }
    }

    /// Commit the turn and recover from blocked movement.
    pub(crate) fn post_move(
        &mut self,
        state: &MoveState,
        dt: Fixed,
        ctx: &mut MotionContext,
        events: &mut Vec<MotionUpdate>,
    ) {
        let moved = state.pos != state.initial;
        if let Some(p) = ctx.positions.get_mut(self.entity) {
            p.previous = p.value;
            p.value = state.pos;
            p.rotation = state.angle;
        }
        if let Some(tag) = self.shape {
            let committed = ctx
                .obstructions
                .move_shape(tag, state.pos, state.angle)
                .and_then(|()| ctx.obstructions.set_unit_moving_flag(tag, moved));
            if let Err(e) = committed {
                warn!(entity = self.entity, "Failed to update unit obstruction: {e}");
            }
        }
        self.last_turn_speed = if dt > Fixed::ZERO {
            state.initial.distance(state.pos) / dt
        } else {
            Fixed::ZERO
        };
        self.push_pressure = self.push_pressure / 2 + state.pressure;

        if !self.move_request.is_some() || !state.moving {
            return;
        }
        if state.was_obstructed {
            self.handle_obstructed_move(state.pos, state.angle, ctx, events);
            return;
        }
        self.failed_movements = 0;

        let exhausted = self.long_path.is_empty() && self.short_path.is_empty() && self.expected_ticket.is_none();
        if !exhausted || self.is_in_range(state.pos, ctx) {
            return;
        }
        if self.known_imperfect_countdown > 0 {
            // Closest reachable point: tell the host instead of retrying.
            events.push(MotionUpdate {
                entity: self.entity,
                kind: MotionUpdateKind::LikelyFailure,
            });
        } else {
            self.compute_path_to_goal(state.pos, ctx);
        }
    }

    fn should_alternate_pathfinder(&self) -> bool {
        self.failed_movements >= ALTERNATE_PATH_TYPE_DELAY
            && (self.failed_movements - ALTERNATE_PATH_TYPE_DELAY) % ALTERNATE_PATH_TYPE_EVERY == 0
    }

    fn handle_obstructed_move(
        &mut self,
        pos: Vec2Fixed,
        angle: Fixed,
        ctx: &mut MotionContext,
        events: &mut Vec<MotionUpdate>,
    ) {
        self.failed_movements = self.failed_movements.saturating_add(1);
        if self.failed_movements >= 2 {
            events.push(MotionUpdate {
                entity: self.entity,
                kind: MotionUpdateKind::Obstructed,
            });
        }
        if self.failed_movements >= MAX_FAILED_MOVEMENTS {
            debug!(entity = self.entity, "Movement keeps failing");
            events.push(MotionUpdate {
                entity: self.entity,
                kind: MotionUpdateKind::LikelyFailure,
            });
            self.failed_movements = 0;
            return;
        }
        if self.expected_ticket.is_some() || self.is_in_range(pos, ctx) {
            return;
        }

        if self.failed_movements == BACKUP_HACK_DELAY {
            let back = pos - Vec2Fixed::from_heading(angle) * (self.clearance * 2);
            let clear = ctx.pathfinder.check_movement(
                ctx.obstructions,
                &self.movement_filter(),
                pos,
                back,
                self.clearance,
                self.pass_class,
            );
            if clear {
                trace!(entity = self.entity, "backing up");
                self.short_path = WaypointPath::from_walk_order(vec![back]);
                return;
            }
        }

        let Some(goal) = self.compute_goal(pos, false, ctx) else {
            return;
        };
        if self.long_path.len() > 1 {
            if let Some(next) = self.long_path.next() {
                if next.distance_squared(pos) < SHORT_PATH_GOAL_RADIUS * SHORT_PATH_GOAL_RADIUS {
                    self.long_path.pop_next();
                }
            }
        }

        if self.should_alternate_pathfinder() {
            self.short_path.clear();
            self.request_long_path(pos, goal, ctx);
            return;
        }

        let range = (SHORT_PATH_MIN_SEARCH_RANGE
            + SHORT_PATH_SEARCH_RANGE_INCREMENT * Fixed::from_num(self.failed_movements))
        .min(SHORT_PATH_MAX_SEARCH_RANGE);
        let short_goal = match self.long_path.next() {
            Some(next) if self.long_path.len() > 1 || !goal.contains_point(next) => {
                PathGoal::circle(next, SHORT_PATH_GOAL_RADIUS, false)
            }
            _ => goal,
        };
        self.short_path.clear();
        self.request_short_path(pos, short_goal, range, ctx);
    }
}
