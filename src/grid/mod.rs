//! World-to-grid location
//!
//! Maps world coordinates onto the discretized model domain. Used to place
//! pilot points, observation wells and particles onto (row, col, layer) cells.

pub mod locator;

pub use locator::{locate, CellBounds, GridCellLocator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Invalid grid parameter: {0}")]
    InvalidParameter(String),

    #[error("Point ({x}, {y}, {z}) lies outside the grid domain")]
    OutOfDomain { x: f64, y: f64, z: f64 },
}
