//! # Navigation Development Tools
//!
//! Command-line tools for development:
//! - Passability configuration validator
//! - Pathfinding benchmark on seeded obstacle maps

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod bench;
pub mod validate;
