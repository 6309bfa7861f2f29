//! Navigation simulation façade.
//!
//! [`NavSimulation`] owns every navigation subsystem and advances them in a
//! fixed order so lockstep peers stay identical. A host mirrors its entity
//! transforms into the position table, issues motion commands, and reads
//! back [`TickEvents`].
//!
//! ## Turn order
//!
//! 1. Deliver the path results computed at the end of the previous turn.
//! 2. Run unit motion (moves, pushing, new path requests).
//! 3. Apply obstruction changes to the navcell grid.
//! 4. Compute queued path requests on the worker pool.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::components::{EntityId, MotionTemplate, Position, INVALID_ENTITY};
use crate::error::{NavError, Result};
use crate::grid::NAVCELLS_PER_TILE;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::motion::{MotionContext, MotionManager, MotionUpdate, PositionTable};
use crate::obstruction::{ObstructionFlags, ObstructionManager, ObstructionState, ShapeTag};
use crate::passability::PassabilityConfig;
use crate::path::PathResultMessage;
use crate::pathfinder::{Pathfinder, PathfinderConfig, RequestQueueState};
use crate::terrain::{HeightmapTerrain, TerrainSource};

/// Default turn length: 200 ms.
pub const TURN_LENGTH: Fixed = Fixed::from_bits(858_993_459);

/// Flags of a building-like obstruction.
pub const STRUCTURE_FLAGS: ObstructionFlags = ObstructionFlags(
    ObstructionFlags::BLOCK_MOVEMENT.0
        | ObstructionFlags::BLOCK_FOUNDATION.0
        | ObstructionFlags::BLOCK_CONSTRUCTION.0
        | ObstructionFlags::BLOCK_PATHFINDING.0,
);

/// Everything a turn produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Path results delivered this turn, in ticket order.
    pub path_results: Vec<PathResultMessage>,
    /// Motion notifications, in entity order.
    pub motion_updates: Vec<MotionUpdate>,
}

/// Serialized form of a [`NavSimulation`].
///
/// Derived data (grids, regions, jump cache) is rebuilt on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavSnapshot {
    /// Turns completed.
    pub tick: u64,
    /// Seconds per turn.
    #[serde(with = "fixed_serde")]
    pub turn_length: Fixed,
    /// Terrain the grids were built from.
    pub terrain: HeightmapTerrain,
    /// Passability classes.
    pub passability: PassabilityConfig,
    /// Orchestrator tunables.
    pub pathfinder_config: PathfinderConfig,
    /// Obstruction shapes.
    pub obstructions: ObstructionState,
    /// Entity positions.
    pub positions: PositionTable,
    /// Unit motion state.
    pub motion: MotionManager,
    /// Queued requests and undelivered results.
    pub queue: RequestQueueState,
}

/// The navigation simulation.
#[derive(Debug)]
pub struct NavSimulation {
    tick: u64,
    turn_length: Fixed,
    terrain: HeightmapTerrain,
    passability: PassabilityConfig,
    pathfinder: Pathfinder,
    obstructions: ObstructionManager,
    positions: PositionTable,
    motion: MotionManager,
}

impl NavSimulation {
    /// Build a simulation over `terrain` and compute the initial grids.
    #[must_use]
    pub fn new(terrain: HeightmapTerrain, passability: PassabilityConfig, config: PathfinderConfig) -> Self {
        let size = terrain.tiles_per_side().saturating_mul(NAVCELLS_PER_TILE);
        let mut obstructions = ObstructionManager::new(size, size);
        let mut pathfinder = Pathfinder::new(config, &passability);
        pathfinder.load_terrain(&terrain, &mut obstructions);
        pathfinder.update_grid(&mut obstructions);
        debug!(size, classes = pathfinder.pass_classes().count(), "navigation simulation created");
        Self {
            tick: 0,
            turn_length: TURN_LENGTH,
            terrain,
            passability,
            pathfinder,
            obstructions,
            positions: PositionTable::new(),
            motion: MotionManager::new(),
        }
    }

    /// Flat map of `tiles x tiles` terrain tiles with default classes.
    #[must_use]
    pub fn flat(tiles: u16, config: PathfinderConfig) -> Self {
        Self::new(HeightmapTerrain::flat(tiles), PassabilityConfig::default(), config)
    }

    /// Advance one turn.
    ///
    /// # Example
    ///
    /// ```
    /// use nav_core::pathfinder::PathfinderConfig;
    /// use nav_core::simulation::NavSimulation;
    ///
    /// let mut sim = NavSimulation::flat(8, PathfinderConfig::default());
    /// let events = sim.tick();
    /// assert!(events.path_results.is_empty());
    /// assert_eq!(sim.tick_count(), 1);
    /// ```
    pub fn tick(&mut self) -> TickEvents {
        let path_results = self.pathfinder.fetch_async_results();

        let mut ctx = MotionContext {
            pathfinder: &mut self.pathfinder,
            obstructions: &mut self.obstructions,
            positions: &mut self.positions,
        };
        self.motion.handle_path_results(&path_results, &mut ctx);
        let motion_updates = self.motion.update(self.turn_length, &mut ctx);

        self.pathfinder.update_grid(&mut self.obstructions);
        self.pathfinder.start_processing_moves(&self.obstructions);

        self.tick += 1;
        trace!(
            tick = self.tick,
            results = path_results.len(),
            updates = motion_updates.len(),
            "turn complete"
        );
        TickEvents {
            path_results,
            motion_updates,
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Place a unit and give it a motion.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity already has a position.
    pub fn spawn_unit(&mut self, entity: EntityId, at: Vec2Fixed, template: &MotionTemplate) -> Result<()> {
        if self.positions.get(entity).is_some() {
            return Err(NavError::InvalidState(format!("Entity {entity} already exists")));
        }
        self.positions.insert(entity, Position::new(at));
        let (motion, mut ctx) = self.motion_mut();
        if let Err(e) = motion.add_unit(entity, template, &mut ctx) {
            self.positions.remove(entity);
            return Err(e);
        }
        Ok(())
    }

    /// Place a static rectangular obstruction owned by `entity`. The grid
    /// picks it up on the next turn.
    pub fn add_structure(
        &mut self,
        entity: EntityId,
        center: Vec2Fixed,
        angle: Fixed,
        width: Fixed,
        depth: Fixed,
        flags: ObstructionFlags,
    ) -> ShapeTag {
        let mut position = Position::new(center);
        position.rotation = angle;
        self.positions.insert(entity, position);
        self.obstructions
            .add_static_shape(entity, center, angle, width, depth, flags, entity, INVALID_ENTITY)
    }

    /// Remove an entity with its motion and obstruction.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::EntityNotFound`] if the entity is unknown.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        if self.positions.remove(entity).is_none() {
            return Err(NavError::EntityNotFound(entity));
        }
        if self.motion.unit(entity).is_some() {
            let mut ctx = MotionContext {
                pathfinder: &mut self.pathfinder,
                obstructions: &mut self.obstructions,
                positions: &mut self.positions,
            };
            self.motion.remove_unit(entity, &mut ctx)?;
        } else if let Some(tag) = self.obstructions.shape_of_entity(entity) {
            self.obstructions.remove_shape(tag)?;
        }
        Ok(())
    }

    /// Order a unit within range of a point.
    pub fn move_to_point_range(&mut self, entity: EntityId, point: Vec2Fixed, min_range: Fixed, max_range: Fixed) -> bool {
        let (motion, mut ctx) = self.motion_mut();
        motion.move_to_point_range(entity, point, min_range, max_range, &mut ctx)
    }

    /// Order a unit within range of another entity.
    pub fn move_to_target_range(&mut self, entity: EntityId, target: EntityId, min_range: Fixed, max_range: Fixed) -> bool {
        let (motion, mut ctx) = self.motion_mut();
        motion.move_to_target_range(entity, target, min_range, max_range, &mut ctx)
    }

    /// Cancel a unit's order.
    pub fn stop_moving(&mut self, entity: EntityId) {
        let (motion, mut ctx) = self.motion_mut();
        motion.stop_moving(entity, &mut ctx);
    }

    /// The motion manager together with the context its commands need.
    pub fn motion_mut(&mut self) -> (&mut MotionManager, MotionContext<'_>) {
        (
            &mut self.motion,
            MotionContext {
                pathfinder: &mut self.pathfinder,
                obstructions: &mut self.obstructions,
                positions: &mut self.positions,
            },
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Turns completed.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Seconds per turn.
    #[must_use]
    pub fn turn_length(&self) -> Fixed {
        self.turn_length
    }

    /// Change the turn length.
    pub fn set_turn_length(&mut self, turn_length: Fixed) {
        self.turn_length = turn_length;
    }

    /// Current position of an in-world entity.
    #[must_use]
    pub fn position(&self, entity: EntityId) -> Option<Vec2Fixed> {
        self.positions.position(entity)
    }

    /// The orchestrator.
    #[must_use]
    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    /// The orchestrator, for direct queries and requests.
    pub fn pathfinder_mut(&mut self) -> &mut Pathfinder {
        &mut self.pathfinder
    }

    /// The obstruction index.
    #[must_use]
    pub fn obstructions(&self) -> &ObstructionManager {
        &self.obstructions
    }

    /// The position table.
    #[must_use]
    pub fn positions(&self) -> &PositionTable {
        &self.positions
    }

    /// The motion manager.
    #[must_use]
    pub fn motion(&self) -> &MotionManager {
        &self.motion
    }

    // ------------------------------------------------------------------
    // Determinism and persistence
    // ------------------------------------------------------------------

    /// Hash of all persistent state. Equal hashes on two peers mean the
    /// peers agree.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.turn_length.to_bits().hash(&mut hasher);
        self.obstructions.state().hash(&mut hasher);
        self.positions.hash(&mut hasher);
        self.motion.hash(&mut hasher);
        self.pathfinder.queue_state().hash(&mut hasher);
        hasher.finish()
    }

    /// Persistent state.
    #[must_use]
    pub fn snapshot(&self) -> NavSnapshot {
        NavSnapshot {
            tick: self.tick,
            turn_length: self.turn_length,
            terrain: self.terrain.clone(),
            passability: self.passability.clone(),
            pathfinder_config: self.pathfinder.config().clone(),
            obstructions: self.obstructions.state(),
            positions: self.positions.clone(),
            motion: self.motion.clone(),
            queue: self.pathfinder.queue_state(),
        }
    }

    /// Rebuild a simulation from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: NavSnapshot) -> Self {
        let mut obstructions = ObstructionManager::from_state(snapshot.obstructions);
        let mut pathfinder = Pathfinder::new(snapshot.pathfinder_config, &snapshot.passability);
        pathfinder.load_terrain(&snapshot.terrain, &mut obstructions);
        pathfinder.update_grid(&mut obstructions);
        pathfinder.restore_queue(snapshot.queue);
        debug!(tick = snapshot.tick, "navigation simulation restored");
        Self {
            tick: snapshot.tick,
            turn_length: snapshot.turn_length,
            terrain: snapshot.terrain,
            passability: snapshot.passability,
            pathfinder,
            obstructions,
            positions: snapshot.positions,
            motion: snapshot.motion,
        }
    }

    /// Serialize the simulation state for save games or late joiners.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.snapshot())
            .map_err(|e| NavError::InvalidState(format!("Failed to serialize navigation state: {e}")))
    }

    /// Deserialize a simulation from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid snapshot.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let snapshot: NavSnapshot = bincode::deserialize(data)
            .map_err(|e| NavError::InvalidState(format!("Failed to deserialize navigation state: {e}")))?;
        Ok(Self::from_snapshot(snapshot))
    }
}
