//! Passability classes.
//!
//! A passability class is a named rule set (water depth, slope, shore
//! distance, clearance and obstruction handling) that decides which navcells
//! a kind of unit or building may occupy. Each class owns one bit of the
//! navcell mask. Classes are data-driven and loaded from RON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::grid::{PassClassMask, SCRATCH_BIT};
use crate::math::{fixed_serde, option_fixed_serde, Fixed};

/// Maximum number of classes; the top mask bit is reserved as scratch.
pub const MAX_PASSABILITY_CLASSES: usize = 15;

/// How a passability class reacts to obstruction shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObstructionPolicy {
    /// Obstructions are ignored (terrain-only class).
    None,
    /// Shapes flagged as blocking pathfinding are stamped with the class
    /// clearance.
    #[default]
    Pathfinding,
    /// Shapes flagged as blocking foundations are stamped without clearance.
    Foundation,
}

/// Data-driven passability class definition.
///
/// # Example RON
///
/// ```ron
/// PassabilityClassDef(
///     name: "default",
///     max_water_depth: Some(8589934592),     // Fixed-point for 2.0
///     max_terrain_slope: Some(4294967296),   // Fixed-point for 1.0
///     clearance: 3435973837,                 // Fixed-point for 0.8
///     obstructions: Pathfinding,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassabilityClassDef {
    /// Unique class name.
    pub name: String,

    /// Minimum water depth (negative values allow dry land).
    #[serde(default, with = "option_fixed_serde")]
    pub min_water_depth: Option<Fixed>,

    /// Maximum water depth.
    #[serde(default, with = "option_fixed_serde")]
    pub max_water_depth: Option<Fixed>,

    /// Maximum terrain slope (rise over run).
    #[serde(default, with = "option_fixed_serde")]
    pub max_terrain_slope: Option<Fixed>,

    /// Minimum signed distance to the shoreline.
    #[serde(default, with = "option_fixed_serde")]
    pub min_shore_distance: Option<Fixed>,

    /// Maximum signed distance to the shoreline.
    #[serde(default, with = "option_fixed_serde")]
    pub max_shore_distance: Option<Fixed>,

    /// Distance kept between unit centers and obstructions.
    #[serde(default, with = "fixed_serde")]
    pub clearance: Fixed,

    /// Obstruction handling.
    #[serde(default)]
    pub obstructions: ObstructionPolicy,
}

impl PassabilityClassDef {
    /// Create a class with no terrain restrictions.
    #[must_use]
    pub fn unrestricted(name: &str, clearance: Fixed, obstructions: ObstructionPolicy) -> Self {
        Self {
            name: name.to_string(),
            min_water_depth: None,
            max_water_depth: None,
            max_terrain_slope: None,
            min_shore_distance: None,
            max_shore_distance: None,
            clearance,
            obstructions,
        }
    }
}

/// The full passability class table as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassabilityConfig {
    /// Class definitions, in mask-bit order.
    pub classes: Vec<PassabilityClassDef>,
}

impl Default for PassabilityConfig {
    fn default() -> Self {
        let two = Fixed::from_num(2);
        let clearance_small = Fixed::from_num(4) / 5;
        Self {
            classes: vec![
                PassabilityClassDef {
                    max_water_depth: Some(two),
                    max_terrain_slope: Some(Fixed::ONE),
                    ..PassabilityClassDef::unrestricted(
                        "default",
                        clearance_small,
                        ObstructionPolicy::Pathfinding,
                    )
                },
                PassabilityClassDef {
                    max_water_depth: Some(two),
                    max_terrain_slope: Some(Fixed::ONE),
                    ..PassabilityClassDef::unrestricted(
                        "large",
                        Fixed::from_num(4),
                        ObstructionPolicy::Pathfinding,
                    )
                },
                PassabilityClassDef {
                    min_water_depth: Some(Fixed::ONE),
                    ..PassabilityClassDef::unrestricted(
                        "ship",
                        two,
                        ObstructionPolicy::Pathfinding,
                    )
                },
                PassabilityClassDef {
                    max_water_depth: Some(Fixed::ZERO),
                    max_terrain_slope: Some(Fixed::ONE),
                    min_shore_distance: Some(Fixed::from_num(4)),
                    ..PassabilityClassDef::unrestricted(
                        "building-land",
                        Fixed::ZERO,
                        ObstructionPolicy::Foundation,
                    )
                },
                PassabilityClassDef::unrestricted(
                    "unrestricted",
                    Fixed::ZERO,
                    ObstructionPolicy::None,
                ),
            ],
        }
    }
}

impl PassabilityConfig {
    /// Parse a configuration document. `label` names the source in errors.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|source| NavError::ConfigParse {
            path: label.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| NavError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&path.display().to_string(), &text)
    }

    /// Check structural consistency, collecting every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.classes.len() > MAX_PASSABILITY_CLASSES {
            errors.push(format!(
                "{} classes defined, at most {MAX_PASSABILITY_CLASSES} allowed",
                self.classes.len()
            ));
        }

        for (index, class) in self.classes.iter().enumerate() {
            if class.name.is_empty() {
                errors.push(format!("class #{index} has an empty name"));
            }
            if self.classes[..index].iter().any(|c| c.name == class.name) {
                errors.push(format!("duplicate class name '{}'", class.name));
            }
            if class.clearance < Fixed::ZERO {
                errors.push(format!("class '{}' has negative clearance", class.name));
            }
            if let (Some(min), Some(max)) = (class.min_water_depth, class.max_water_depth) {
                if min > max {
                    errors.push(format!("class '{}' has min_water_depth > max_water_depth", class.name));
                }
            }
            if let (Some(min), Some(max)) = (class.min_shore_distance, class.max_shore_distance) {
                if min > max {
                    errors.push(format!(
                        "class '{}' has min_shore_distance > max_shore_distance",
                        class.name
                    ));
                }
            }
            if class.max_terrain_slope.is_some_and(|s| s < Fixed::ZERO) {
                errors.push(format!("class '{}' has negative max_terrain_slope", class.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NavError::InvalidPassabilityConfig { errors })
        }
    }
}

/// A compiled passability class with its mask bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassabilityClass {
    /// Source definition.
    pub def: PassabilityClassDef,
    /// Single-bit mask for this class.
    pub mask: PassClassMask,
}

impl PassabilityClass {
    /// Class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Clearance radius.
    #[must_use]
    pub fn clearance(&self) -> Fixed {
        self.def.clearance
    }

    /// Whether terrain with these properties is passable for this class.
    #[must_use]
    pub fn is_terrain_passable(&self, water_depth: Fixed, slope: Fixed, shore_distance: i32) -> bool {
        let d = &self.def;
        let shore = Fixed::from_num(shore_distance);
        d.min_water_depth.map_or(true, |m| water_depth >= m)
            && d.max_water_depth.map_or(true, |m| water_depth <= m)
            && d.max_terrain_slope.map_or(true, |m| slope <= m)
            && d.min_shore_distance.map_or(true, |m| shore >= m)
            && d.max_shore_distance.map_or(true, |m| shore <= m)
    }
}

/// The active passability class table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassabilityClasses {
    classes: Vec<PassabilityClass>,
}

impl PassabilityClasses {
    /// Compile a configuration into mask-bearing classes.
    ///
    /// Definitions past [`MAX_PASSABILITY_CLASSES`] are dropped with an error
    /// log; zero clearance on a pathfinding class is allowed but logged.
    #[must_use]
    pub fn from_config(config: &PassabilityConfig) -> Self {
        if config.classes.len() > MAX_PASSABILITY_CLASSES {
            tracing::error!(
                count = config.classes.len(),
                "Too many passability classes, ignoring the excess"
            );
        }
        let classes = config
            .classes
            .iter()
            .take(MAX_PASSABILITY_CLASSES)
            .enumerate()
            .map(|(index, def)| {
                if def.clearance == Fixed::ZERO && def.obstructions == ObstructionPolicy::Pathfinding {
                    tracing::warn!(class = %def.name, "Pathfinding class has zero clearance");
                }
                let mut def = def.clone();
                if def.clearance < Fixed::ZERO {
                    tracing::error!(class = %def.name, "Negative clearance, using zero");
                    def.clearance = Fixed::ZERO;
                }
                let mask = 1 << index;
                debug_assert!(mask & SCRATCH_BIT == 0);
                PassabilityClass { def, mask }
            })
            .collect();
        Self { classes }
    }

    /// Look up a class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PassabilityClass> {
        self.classes.iter().find(|c| c.def.name == name)
    }

    /// Look up a class by its mask bit.
    #[must_use]
    pub fn by_mask(&self, mask: PassClassMask) -> Option<&PassabilityClass> {
        self.classes.iter().find(|c| c.mask == mask)
    }

    /// Mask for a class name, logging and returning 0 for unknown names.
    #[must_use]
    pub fn mask(&self, name: &str) -> PassClassMask {
        match self.get(name) {
            Some(class) => class.mask,
            None => {
                tracing::error!(class = name, "Invalid passability class name");
                0
            }
        }
    }

    /// Mask for a class name, as a `Result`.
    pub fn try_mask(&self, name: &str) -> Result<PassClassMask> {
        self.get(name)
            .map(|c| c.mask)
            .ok_or_else(|| NavError::UnknownPassabilityClass(name.to_string()))
    }

    /// Clearance of the class with this mask (zero if unknown).
    #[must_use]
    pub fn clearance(&self, mask: PassClassMask) -> Fixed {
        self.by_mask(mask).map_or(Fixed::ZERO, |c| c.def.clearance)
    }

    /// Largest clearance over all classes.
    #[must_use]
    pub fn max_clearance(&self) -> Fixed {
        self.classes
            .iter()
            .map(|c| c.def.clearance)
            .max()
            .unwrap_or(Fixed::ZERO)
    }

    /// Iterate over all classes in mask-bit order.
    pub fn iter(&self) -> impl Iterator<Item = &PassabilityClass> {
        self.classes.iter()
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
