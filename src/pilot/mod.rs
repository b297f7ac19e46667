//! Pilot Points
//!
//! The authoritative record of pilot-point locations, their cells, their
//! current values and the variogram used to interpolate between them.
//!
//! ## Lifecycle
//!
//! 1. `SamplingLayout::points()` lays out the requested pilot locations
//! 2. `PilotPointStore::sample()` locates each one and reads the reference field
//! 3. `fit_variogram()` / `set_variogram()` attaches the spatial model
//! 4. `persist()` writes the snapshot consumed by every later stage
//! 5. `update_values()` ingests optimizer estimates; `interpolate()` krigs them
//!
//! Points are never removed once sampled.

pub mod layout;
pub mod naming;
pub mod store;

pub use layout::SamplingLayout;
pub use naming::PilotNaming;
pub use store::{PilotPoint, PilotPointStore, SCHEMA_VERSION};

use std::path::PathBuf;

use thiserror::Error;

use crate::geostat::{KrigingError, VariogramError};
use crate::grid::GridError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Variogram(#[from] VariogramError),

    #[error(transparent)]
    Kriging(#[from] KrigingError),

    #[error("{field} field is {found_rows}x{found_cols}, grid is {nrow}x{ncol}")]
    ShapeMismatch {
        field: &'static str,
        found_rows: usize,
        found_cols: usize,
        nrow: usize,
        ncol: usize,
    },

    #[error("Invalid sampling layout: {0}")]
    InvalidLayout(String),

    #[error("Pilot point '{0}' would occupy an already sampled cell")]
    DuplicateCell(String),

    #[error("Unknown pilot point '{0}'")]
    UnknownId(String),

    #[error("Invalid value {value} for pilot point '{id}'")]
    InvalidValue { id: String, value: f64 },

    #[error("No variogram has been fitted or assigned")]
    MissingVariogram,

    #[error("Pilot point '{0}' has no observed value")]
    MissingObservation(String),

    #[error("Snapshot schema version {found} is newer than the supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
