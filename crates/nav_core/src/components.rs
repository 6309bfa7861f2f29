//! Component definitions shared by the navigation systems.
//!
//! Components are pure data with no behavior.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities.
pub type EntityId = u64;

/// Sentinel entity id meaning "no entity".
pub const INVALID_ENTITY: EntityId = 0;

// ============================================================================
// Position
// ============================================================================

/// Position of an entity on the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Current position.
    pub value: Vec2Fixed,
    /// Position at the start of the previous turn.
    pub previous: Vec2Fixed,
    /// Heading in radians (0 faces +y).
    #[serde(with = "fixed_serde")]
    pub rotation: Fixed,
    /// Whether the entity is placed in the world.
    pub in_world: bool,
}

impl Position {
    /// Create an in-world position with no previous movement.
    #[must_use]
    pub fn new(value: Vec2Fixed) -> Self {
        Self {
            value,
            previous: value,
            rotation: Fixed::ZERO,
            in_world: true,
        }
    }

    /// Displacement over the previous turn.
    #[must_use]
    pub fn last_motion(&self) -> Vec2Fixed {
        self.value - self.previous
    }
}

// ============================================================================
// Motion template
// ============================================================================

/// Data-driven movement parameters of a unit type.
///
/// # Example RON
///
/// ```ron
/// MotionTemplate(
///     walk_speed: 38654705664,       // Fixed-point for 9.0
///     run_multiplier: 7301444403,    // Fixed-point for 1.7
///     turn_rate: 21474836480,        // Fixed-point for 5.0
///     pass_class: "default",
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionTemplate {
    /// Walking speed in world units per second.
    #[serde(with = "fixed_serde")]
    pub walk_speed: Fixed,
    /// Running speed as a multiple of walking speed.
    #[serde(with = "fixed_serde", default = "default_run_multiplier")]
    pub run_multiplier: Fixed,
    /// Maximum rotation speed in radians per second.
    #[serde(with = "fixed_serde", default = "default_turn_rate")]
    pub turn_rate: Fixed,
    /// Passability class name.
    pub pass_class: String,
    /// Whether this entity is a formation controller.
    #[serde(default)]
    pub formation_controller: bool,
}

fn default_run_multiplier() -> Fixed {
    Fixed::ONE
}

fn default_turn_rate() -> Fixed {
    Fixed::from_num(12)
}

impl MotionTemplate {
    /// Template with the given walk speed and class, other fields defaulted.
    #[must_use]
    pub fn new(walk_speed: Fixed, pass_class: &str) -> Self {
        Self {
            walk_speed,
            run_multiplier: default_run_multiplier(),
            turn_rate: default_turn_rate(),
            pass_class: pass_class.to_string(),
            formation_controller: false,
        }
    }
}
