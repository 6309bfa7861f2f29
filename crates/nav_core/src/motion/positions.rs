//! Entity positions as seen by the motion system.
//!
//! The host owns entity transforms; it mirrors them into a
//! [`PositionTable`] and reads back what unit motion wrote.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Position};
use crate::math::{Fixed, Vec2Fixed};

/// Positions of every tracked entity, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionTable {
    entries: BTreeMap<EntityId, Position>,
}

impl PositionTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity.
    pub fn insert(&mut self, entity: EntityId, position: Position) {
        self.entries.insert(entity, position);
    }

    /// Forget an entity.
    pub fn remove(&mut self, entity: EntityId) -> Option<Position> {
        self.entries.remove(&entity)
    }

    /// Full position record.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&Position> {
        self.entries.get(&entity)
    }

    /// Mutable position record.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut Position> {
        self.entries.get_mut(&entity)
    }

    /// Current point of an in-world entity.
    #[must_use]
    pub fn position(&self, entity: EntityId) -> Option<Vec2Fixed> {
        self.entries
            .get(&entity)
            .filter(|p| p.in_world)
            .map(|p| p.value)
    }

    /// Teleport an entity. Its previous position follows so no motion is
    /// extrapolated from the jump.
    pub fn set_position(&mut self, entity: EntityId, value: Vec2Fixed) {
        if let Some(p) = self.entries.get_mut(&entity) {
            p.value = value;
            p.previous = value;
            p.in_world = true;
        }
    }

    /// Take an entity out of the world (garrisoned, dead).
    pub fn move_out_of_world(&mut self, entity: EntityId) {
        if let Some(p) = self.entries.get_mut(&entity) {
            p.in_world = false;
        }
    }

    /// Set the heading of an entity.
    pub fn set_rotation(&mut self, entity: EntityId, rotation: Fixed) {
        if let Some(p) = self.entries.get_mut(&entity) {
            p.rotation = rotation;
        }
    }

    /// Record the start-of-turn positions used for motion extrapolation.
    pub fn begin_turn(&mut self) {
        for p in self.entries.values_mut() {
            p.previous = p.value;
        }
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Position)> {
        self.entries.iter().map(|(id, p)| (*id, p))
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_world_has_no_position() {
        let mut table = PositionTable::new();
        table.insert(4, Position::new(Vec2Fixed::from_ints(1, 2)));
        assert_eq!(table.position(4), Some(Vec2Fixed::from_ints(1, 2)));
        table.move_out_of_world(4);
        assert_eq!(table.position(4), None);
        assert!(table.get(4).is_some());
        table.set_position(4, Vec2Fixed::from_ints(5, 5));
        assert_eq!(table.position(4), Some(Vec2Fixed::from_ints(5, 5)));
    }

    #[test]
    fn test_begin_turn_resets_motion() {
        let mut table = PositionTable::new();
        table.insert(1, Position::new(Vec2Fixed::ZERO));
        table.get_mut(1).expect("entry").value = Vec2Fixed::from_ints(2, 0);
        assert_eq!(table.get(1).map(Position::last_motion), Some(Vec2Fixed::from_ints(2, 0)));
        table.begin_turn();
        assert_eq!(table.get(1).map(Position::last_motion), Some(Vec2Fixed::ZERO));
    }
}
