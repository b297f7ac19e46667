//! Optimizer Interchange Protocol
//!
//! Text artifacts exchanged with an external parameter-estimation process:
//!
//! - `template` - model input file with `@name@` substitution fields (`ptf`)
//! - `instruction` - how to read simulated observations back out (`pif`)
//! - `control` - full run configuration (`pcf`)
//! - `results` - the optimizer's parameter-value file (`.par`)
//!
//! plus the two model-side files they mirror: the pilot-value input file
//! (`pilot_values`) and the simulated-observation table (`model_output`).
//!
//! Every writer goes through [`atomic::write_text`], so a failed write never
//! leaves a partial file at the destination.

pub mod atomic;
pub mod control;
pub mod instruction;
pub mod model_output;
pub mod pilot_values;
pub mod results;
pub mod template;

pub use atomic::{write_atomic, write_text};
pub use control::{
    ChangeGroupSettings, ControlDocument, ControlSettings, DecimalPoint, DerivativeMethod, FilePair,
    ForcedCentral, GroupDerivativeSettings, IncrementType, PestMode, Precision, RestartMode,
};
pub use instruction::{primary_marker_from_header, InstructionSet, ObservationReadout};
pub use model_output::ObservationTableLayout;
pub use pilot_values::{parse_pilot_values, render_pilot_values, PilotValueRow};
pub use results::{render_results, ResultReader};
pub use template::{apply_template, render_template, TemplateSite};

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

/// Delimiter of template fields and instruction markers.
pub const MARKER: char = '@';

/// Longest parameter name the optimizer accepts.
pub const MAX_PARAMETER_NAME: usize = 12;

/// Longest observation name the optimizer accepts.
pub const MAX_OBSERVATION_NAME: usize = 20;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parameter '{name}' needs {required} columns but its field is {width} wide")]
    FieldWidthExceeded {
        name: String,
        width: usize,
        required: usize,
    },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{kind} name '{name}' is invalid: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Parameter count mismatch: expected {expected}, found {found}")]
    ParameterCountMismatch { expected: usize, found: usize },

    #[error("Parameter order mismatch at record {index}: expected '{expected}', found '{found}'")]
    ParameterOrderMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Invalid template site for '{parameter}': {reason}")]
    InvalidSite { parameter: String, reason: String },

    #[error("Invalid record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error("Invalid readout for '{observation}': {reason}")]
    InvalidReadout { observation: String, reason: String },

    #[error("Marker character '@' found in {0}")]
    MarkerInText(String),

    #[error("Primary marker '{0}' not found in model output")]
    MarkerNotFound(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Check a set of names against the optimizer's naming rules: non-empty, no
/// whitespace or marker, at most `max` characters, unique ignoring case.
pub(crate) fn validate_names<'a>(
    kind: &'static str,
    names: impl IntoIterator<Item = &'a str>,
    max: usize,
) -> Result<(), ProtocolError> {
    let mut seen = HashSet::new();
    for name in names {
        let invalid = |reason: &str| ProtocolError::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("empty"));
        }
        if name.chars().count() > max {
            return Err(invalid(&format!("longer than {max} characters")));
        }
        if name.chars().any(|c| c.is_whitespace() || c == MARKER) {
            return Err(invalid("contains whitespace or the marker character"));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ProtocolError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Most precise rendering of `value` that fits in `width` columns.
pub(crate) fn format_number(value: f64, width: usize) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let plain = value.to_string();
    if plain.len() <= width {
        return Some(plain);
    }
    (0..=16)
        .rev()
        .map(|precision| format!("{value:.precision$e}"))
        .find(|s| s.len() <= width)
}

/// Parse a real number, accepting Fortran `D` exponents.
pub(crate) fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim();
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['D', 'd'], "E").parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
