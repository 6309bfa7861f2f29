//! Passability configuration validation.

use std::path::Path;

use nav_core::error::Result;
use nav_core::passability::{PassabilityClasses, PassabilityConfig};
use serde::Serialize;

/// Summary of one compiled class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    /// Class name.
    pub name: String,
    /// Mask bit assigned to the class.
    pub mask: u16,
    /// Clearance, formatted as a decimal.
    pub clearance: String,
    /// Obstruction policy.
    pub obstructions: String,
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// File that was checked.
    pub path: String,
    /// Classes in mask-bit order.
    pub classes: Vec<ClassSummary>,
}

/// Load a passability configuration and check it.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or fails
/// validation (every problem is listed in the error).
pub fn validate_config_file(path: &Path) -> Result<ValidationReport> {
    let config = PassabilityConfig::load(path)?;
    let compiled = PassabilityClasses::from_config(&config);
    let classes = compiled
        .iter()
        .map(|class| ClassSummary {
            name: class.name().to_string(),
            mask: class.mask,
            clearance: class.clearance().to_string(),
            obstructions: format!("{:?}", class.def.obstructions),
        })
        .collect();
    Ok(ValidationReport {
        path: path.display().to_string(),
        classes,
    })
}
