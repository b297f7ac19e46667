//! System-wide default constants.
//!
//! Values that describe the reference calibration model live here so the
//! config structs and the binaries agree on them.

// ============================================================================
// Config Discovery
// ============================================================================

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "PILOT_POINTS_CONFIG";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "calibration.toml";

// ============================================================================
// Reference Grid
// ============================================================================

/// Rows in the reference model (800 m north-south at 10 m).
pub const GRID_NROW: usize = 80;

/// Columns in the reference model (500 m east-west at 10 m).
pub const GRID_NCOL: usize = 50;

/// Uniform column width (m).
pub const GRID_DELR: f64 = 10.0;

/// Uniform row height (m).
pub const GRID_DELC: f64 = 10.0;

/// Aquifer top elevation (m).
pub const GRID_TOP: f64 = 0.0;

/// Aquifer bottom elevation (m).
pub const GRID_BOTTOM: f64 = -10.0;

// ============================================================================
// Protocol Files
// ============================================================================

/// Command the optimizer runs for each model evaluation.
pub const MODEL_COMMAND: &str = "model.bat";

pub const PILOT_VALUES_FILE: &str = "pilot_points.dat";
pub const TEMPLATE_FILE: &str = "pilot_points.tpl";
pub const INSTRUCTION_FILE: &str = "heads.ins";
pub const MODEL_OUTPUT_FILE: &str = "heads.out";
pub const CONTROL_FILE: &str = "calibration.pst";
pub const SNAPSHOT_FILE: &str = "pilot_points.json";
pub const FIELD_FILE: &str = "interpolated_field.json";

// ============================================================================
// Synthetic Truth Field
// ============================================================================

/// Mean hydraulic conductivity of the synthetic truth field (m/d).
pub const TRUTH_MEAN_HK: f64 = 5.0;

/// Standard deviation of ln(hk) in the synthetic truth field.
pub const TRUTH_LN_SIGMA: f64 = 0.5;
