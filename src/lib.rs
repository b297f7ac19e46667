//! Pilot Points: geostatistical parameterisation for model calibration
//!
//! Estimates a spatially varying parameter field (e.g. hydraulic
//! conductivity) from a sparse set of pilot points and drives an external
//! optimizer through its template / instruction / control file protocol.
//!
//! ## Architecture
//!
//! - **Grid**: world coordinates to `(row, col, layer)` cells
//! - **Geostat**: variogram models, fitting and ordinary kriging
//! - **Pilot**: the pilot-point store and its JSON snapshot
//! - **Protocol**: optimizer interchange files
//! - **Calibration**: the stage machine and the simulator / optimizer ports

pub mod calibration;
pub mod config;
pub mod geostat;
pub mod grid;
pub mod pilot;
pub mod protocol;
pub mod types;

// Re-export configuration
pub use config::{CalibrationConfig, ConfigError};

// Re-export commonly used types
pub use types::{
    CellAddress, GridArray, GridSpec, InterpolatedField, LengthUnit, ObservationRecord,
    ParTransform, ParameterRecord, Point,
};

// Re-export the engine
pub use geostat::{
    fit_and_predict, KrigingError, OrdinaryKriging, Prediction, VariogramError, VariogramKind,
    VariogramModel, VariogramParameters,
};
pub use grid::{locate, GridCellLocator, GridError};
pub use pilot::{PilotPoint, PilotPointStore, StoreError};
pub use protocol::ProtocolError;

// Re-export the calibration cycle
pub use calibration::{
    CalibrationCycle, CalibrationStage, CycleError, OptimizerPort, PortError, SimulatorPort,
};
