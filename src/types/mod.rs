//! Shared data structures for pilot-point calibration
//!
//! This module defines the core types passed between stages:
//! - Discretization: GridSpec, Point, CellAddress
//! - Fields: GridArray (reference/observed fields), InterpolatedField (kriging output)
//! - Optimizer schema: ParameterRecord, ObservationRecord and their defaults

mod grid;
mod field;
mod records;

pub use grid::*;
pub use field::*;
pub use records::*;
