//! Calibration Cycle
//!
//! Drives one pilot-point calibration from sampled points to an
//! interpolated field:
//!
//! ```text
//! Sampled -> VariogramFitted -> ProtocolEmitted -> (external optimizer)
//!         -> ResultsParsed -> Interpolated
//! ```
//!
//! Any failed stage moves the cycle to `Aborted`; nothing is retried.
//! The simulator and the optimizer are external processes reached through
//! `SimulatorPort` and `OptimizerPort`.

pub mod cycle;
pub mod emit;
pub mod ports;

pub use cycle::CalibrationCycle;
pub use emit::{emit_protocol, EmittedProtocol};
pub use ports::{CommandOptimizer, CommandSimulator, OptimizerPort, PortError, SimulatorPort};

use std::path::PathBuf;

use thiserror::Error;

use crate::pilot::StoreError;
use crate::protocol::ProtocolError;

/// Where a calibration cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStage {
    Sampled,
    VariogramFitted,
    ProtocolEmitted,
    ResultsParsed,
    Interpolated,
    Aborted,
}

impl std::fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sampled => write!(f, "SAMPLED"),
            Self::VariogramFitted => write!(f, "VARIOGRAM_FITTED"),
            Self::ProtocolEmitted => write!(f, "PROTOCOL_EMITTED"),
            Self::ResultsParsed => write!(f, "RESULTS_PARSED"),
            Self::Interpolated => write!(f, "INTERPOLATED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Cannot move calibration from {from} to {to}")]
    InvalidTransition {
        from: CalibrationStage,
        to: CalibrationStage,
    },

    #[error("Calibration cycle was aborted by an earlier failure")]
    Aborted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("Calibration I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
