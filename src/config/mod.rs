//! Calibration Configuration Module
//!
//! Grid, variogram, sampling, optimizer and file settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PILOT_POINTS_CONFIG` environment variable (path to TOML file)
//! 2. `calibration.toml` in the current working directory
//! 3. Built-in defaults (the reference 500 m x 800 m model)
//!
//! ## Usage
//!
//! The loaded config is passed explicitly to every stage:
//!
//! ```ignore
//! let config = CalibrationConfig::load();
//! let grid = config.grid_spec()?;
//! let layout = config.sampling.points(&grid)?;
//! ```

mod calibration_config;
pub mod defaults;
pub mod validation;

pub use calibration_config::*;
