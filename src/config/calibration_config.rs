//! Calibration Configuration - every workflow constant as a TOML value
//!
//! Each section implements `Default` with the values of the reference
//! 500 m x 800 m model, so a run without a config file reproduces it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::defaults;
use crate::geostat::{VariogramKind, VariogramParameters, DEFAULT_NLAGS, MIN_LAGS_FOR_FIT};
use crate::grid::GridError;
use crate::pilot::{PilotNaming, SamplingLayout};
use crate::protocol::{ControlSettings, ObservationTableLayout, MAX_OBSERVATION_NAME, MAX_PARAMETER_NAME};
use crate::types::{GridSpec, LengthUnit, ObservationDefaults, ParTransform, ParameterDefaults};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one calibration workspace.
///
/// Load with `CalibrationConfig::load()` which searches:
/// 1. `$PILOT_POINTS_CONFIG` env var
/// 2. `./calibration.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Model discretisation
    #[serde(default)]
    pub grid: GridConfig,

    /// Spatial model used for kriging
    #[serde(default)]
    pub variogram: VariogramConfig,

    /// Pilot-point layout
    #[serde(default)]
    pub sampling: SamplingLayout,

    /// Values applied to every pilot-point parameter
    #[serde(default)]
    pub parameters: ParameterDefaults,

    /// Values applied to every head observation
    #[serde(default)]
    pub observations: ObservationDefaults,

    /// Optimizer control constants
    #[serde(default)]
    pub control: ControlSettings,

    /// Workspace file names and the model command
    #[serde(default)]
    pub files: FileConfig,

    /// Column layout of the simulator's observation table
    #[serde(default)]
    pub output_layout: ObservationTableLayout,
}

impl CalibrationConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PILOT_POINTS_CONFIG` environment variable
    /// 2. `./calibration.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded calibration config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./calibration.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded calibration config");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No calibration.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not fatal.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        crate::protocol::write_atomic(path, contents.as_bytes())
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Calibration config saved");
        Ok(())
    }

    /// Grid described by `[grid]`.
    pub fn grid_spec(&self) -> Result<GridSpec, GridError> {
        self.grid.to_grid_spec()
    }

    /// Parameter and observation naming sized for `grid`.
    pub fn naming(&self, grid: &GridSpec) -> PilotNaming {
        PilotNaming::for_grid(
            self.parameters.prefix.clone(),
            self.observations.prefix.clone(),
            grid,
        )
    }

    /// Reject values that cannot produce a working calibration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let grid = match self.grid.to_grid_spec() {
            Ok(grid) => Some(grid),
            Err(e) => {
                errors.push(format!("grid: {e}"));
                None
            }
        };
        if let Some(spacings) = &self.grid.row_spacings {
            if spacings.len() != self.grid.nrow {
                errors.push(format!(
                    "grid.row_spacings has {} entries but grid.nrow = {}",
                    spacings.len(),
                    self.grid.nrow
                ));
            }
        }
        if let Some(spacings) = &self.grid.col_spacings {
            if spacings.len() != self.grid.ncol {
                errors.push(format!(
                    "grid.col_spacings has {} entries but grid.ncol = {}",
                    spacings.len(),
                    self.grid.ncol
                ));
            }
        }

        self.validate_variogram(&mut errors);

        if let Some(grid) = &grid {
            if let Err(e) = self.sampling.points(grid) {
                errors.push(format!("sampling: {e}"));
            }
            let naming = self.naming(grid);
            let (nrow, ncol) = (grid.nrow(), grid.ncol());
            let longest_parameter = naming.parameter_name(nrow - 1, ncol - 1);
            if longest_parameter.len() > MAX_PARAMETER_NAME {
                errors.push(format!(
                    "parameters.prefix '{}' gives names like '{longest_parameter}', longer than {MAX_PARAMETER_NAME} characters",
                    self.parameters.prefix
                ));
            }
            let longest_observation = naming.observation_name(nrow - 1, ncol - 1);
            let observation_limit = MAX_OBSERVATION_NAME.min(self.output_layout.name_width);
            if longest_observation.len() > observation_limit {
                errors.push(format!(
                    "observations.prefix '{}' gives names like '{longest_observation}', longer than {observation_limit} characters",
                    self.observations.prefix
                ));
            }
        }

        self.validate_parameters(&mut errors);

        let o = &self.observations;
        if o.prefix.is_empty() {
            errors.push("observations.prefix must not be empty".to_string());
        }
        if !o.weight.is_finite() || o.weight < 0.0 {
            errors.push(format!("observations.weight = {} must be >= 0", o.weight));
        }
        if o.group.is_empty() {
            errors.push("observations.group must not be empty".to_string());
        }

        self.validate_control(&mut errors);

        for w in super::validation::validate_plausibility(self) {
            warn!(field = %w.field, "{}", w);
        }

        let f = &self.files;
        if f.command.trim().is_empty() {
            errors.push("files.command must not be empty".to_string());
        }
        for (key, path) in f.named_paths() {
            if path.as_os_str().is_empty() {
                errors.push(format!("files.{key} must not be empty"));
            }
        }

        let layout = &self.output_layout;
        if layout.name_width == 0 {
            errors.push("output_layout.name_width must be > 0".to_string());
        }
        // Room for a sign, one digit, a point and a short exponent
        if layout.value_width < 8 {
            errors.push(format!(
                "output_layout.value_width = {} must be >= 8",
                layout.value_width
            ));
        }
        if layout.marker_width == 0 || layout.primary_marker().is_empty() {
            errors.push("output_layout must yield a non-empty primary marker".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn validate_variogram(&self, errors: &mut Vec<String>) {
        let v = &self.variogram;
        if v.fit {
            if v.nlags < MIN_LAGS_FOR_FIT {
                errors.push(format!(
                    "variogram.nlags = {} must be >= {MIN_LAGS_FOR_FIT} when fitting",
                    v.nlags
                ));
            }
        } else {
            match v.fixed_parameters() {
                Some(params) => {
                    if let Err(e) = params.validate() {
                        errors.push(format!("variogram: {e}"));
                    }
                }
                None => errors.push(
                    "variogram.sill and variogram.range are required when variogram.fit = false"
                        .to_string(),
                ),
            }
        }
    }

    fn validate_parameters(&self, errors: &mut Vec<String>) {
        let p = &self.parameters;
        if p.prefix.is_empty() {
            errors.push("parameters.prefix must not be empty".to_string());
        }
        if [p.initial, p.lower, p.upper, p.scale, p.offset]
            .iter()
            .any(|v| !v.is_finite())
        {
            errors.push("parameters values must all be finite".to_string());
            return;
        }
        if p.lower > p.upper {
            errors.push(format!(
                "parameters.lower ({}) must be <= parameters.upper ({})",
                p.lower, p.upper
            ));
        } else if p.initial < p.lower || p.initial > p.upper {
            errors.push(format!(
                "parameters.initial ({}) must lie within [{}, {}]",
                p.initial, p.lower, p.upper
            ));
        }
        if p.transform == ParTransform::Log && p.lower <= 0.0 {
            errors.push(format!(
                "parameters.lower ({}) must be > 0 for log-transformed parameters",
                p.lower
            ));
        }
        if matches!(p.transform, ParTransform::Tied { .. }) {
            errors.push("parameters.transform cannot tie every pilot point".to_string());
        }
        if p.scale == 0.0 {
            errors.push("parameters.scale must be non-zero".to_string());
        }
        if p.group.is_empty() {
            errors.push("parameters.group must not be empty".to_string());
        }
    }

    fn validate_control(&self, errors: &mut Vec<String>) {
        let c = &self.control;
        let positive = [
            ("rlambda1", c.rlambda1),
            ("phiratsuf", c.phiratsuf),
            ("phiredlam", c.phiredlam),
            ("change.relparmax", c.change.relparmax),
            ("change.facorig", c.change.facorig),
            ("phiredswh", c.phiredswh),
            ("phiredstp", c.phiredstp),
            ("relparstp", c.relparstp),
            ("derivatives.derinc", c.derivatives.derinc),
            ("derivatives.derincmul", c.derivatives.derincmul),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                errors.push(format!("control.{key} = {value} must be > 0"));
            }
        }
        // Negative factors select the optimizer's adaptive lambda scheme
        if !c.rlamfac.is_finite() || (0.0..=1.0).contains(&c.rlamfac) {
            errors.push(format!(
                "control.rlamfac = {} must be > 1 or negative",
                c.rlamfac
            ));
        }
        if !c.change.facparmax.is_finite() || c.change.facparmax <= 1.0 {
            errors.push(format!(
                "control.change.facparmax = {} must be > 1",
                c.change.facparmax
            ));
        }
        if !c.derivatives.derinclb.is_finite() || c.derivatives.derinclb < 0.0 {
            errors.push(format!(
                "control.derivatives.derinclb = {} must be >= 0",
                c.derivatives.derinclb
            ));
        }
        for (key, value) in [
            ("numlam", c.numlam),
            ("nphistp", c.nphistp),
            ("nphinored", c.nphinored),
            ("nrelpar", c.nrelpar),
        ] {
            if value == 0 {
                errors.push(format!("control.{key} must be >= 1"));
            }
        }
    }
}

// ============================================================================
// Grid
// ============================================================================

/// Uniform spacings by default; explicit `row_spacings` / `col_spacings`
/// take precedence when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub nrow: usize,
    pub ncol: usize,
    /// Column width along x.
    pub delr: f64,
    /// Row height along y.
    pub delc: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_spacings: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col_spacings: Option<Vec<f64>>,
    /// Upper-left corner; the domain is centred on (0, 0) when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_origin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_origin: Option<f64>,
    pub top: f64,
    /// Bottom elevation of each layer.
    pub botm: Vec<f64>,
    pub length_unit: LengthUnit,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nrow: defaults::GRID_NROW,
            ncol: defaults::GRID_NCOL,
            delr: defaults::GRID_DELR,
            delc: defaults::GRID_DELC,
            row_spacings: None,
            col_spacings: None,
            x_origin: None,
            y_origin: None,
            top: defaults::GRID_TOP,
            botm: vec![defaults::GRID_BOTTOM],
            length_unit: LengthUnit::Meters,
        }
    }
}

impl GridConfig {
    pub fn to_grid_spec(&self) -> Result<GridSpec, GridError> {
        let rows = self
            .row_spacings
            .clone()
            .unwrap_or_else(|| vec![self.delc; self.nrow]);
        let cols = self
            .col_spacings
            .clone()
            .unwrap_or_else(|| vec![self.delr; self.ncol]);
        let width: f64 = cols.iter().sum();
        let height: f64 = rows.iter().sum();
        let origin = (
            self.x_origin.unwrap_or(-width / 2.0),
            self.y_origin.unwrap_or(height / 2.0),
        );
        GridSpec::new(rows, cols, origin, self.top, self.botm.clone(), self.length_unit)
    }
}

// ============================================================================
// Variogram
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariogramConfig {
    pub kind: VariogramKind,
    /// Fit sill, range and nugget to the sampled values. When false the
    /// fixed values below are used.
    pub fit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sill: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nugget: Option<f64>,
    /// Distance classes of the empirical variogram.
    pub nlags: usize,
}

impl Default for VariogramConfig {
    fn default() -> Self {
        Self {
            kind: VariogramKind::Spherical,
            fit: true,
            sill: None,
            range: None,
            nugget: None,
            nlags: DEFAULT_NLAGS,
        }
    }
}

impl VariogramConfig {
    /// The configured variogram when fitting is off and sill and range are set.
    pub fn fixed_parameters(&self) -> Option<VariogramParameters> {
        if self.fit {
            return None;
        }
        Some(VariogramParameters::new(
            self.kind,
            self.sill?,
            self.range?,
            self.nugget.unwrap_or(0.0),
        ))
    }
}

// ============================================================================
// Files
// ============================================================================

/// File names are relative to the calibration workspace directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Model command line the optimizer runs.
    pub command: String,
    pub pilot_values: PathBuf,
    pub template: PathBuf,
    pub instruction: PathBuf,
    pub model_output: PathBuf,
    pub control: PathBuf,
    pub snapshot: PathBuf,
    pub field: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            command: defaults::MODEL_COMMAND.to_string(),
            pilot_values: PathBuf::from(defaults::PILOT_VALUES_FILE),
            template: PathBuf::from(defaults::TEMPLATE_FILE),
            instruction: PathBuf::from(defaults::INSTRUCTION_FILE),
            model_output: PathBuf::from(defaults::MODEL_OUTPUT_FILE),
            control: PathBuf::from(defaults::CONTROL_FILE),
            snapshot: PathBuf::from(defaults::SNAPSHOT_FILE),
            field: PathBuf::from(defaults::FIELD_FILE),
        }
    }
}

impl FileConfig {
    /// Result file the optimizer writes next to the control file.
    pub fn results(&self) -> PathBuf {
        self.control.with_extension("par")
    }

    fn named_paths(&self) -> [(&'static str, &Path); 7] {
        [
            ("pilot_values", &self.pilot_values),
            ("template", &self.template),
            ("instruction", &self.instruction),
            ("model_output", &self.model_output),
            ("control", &self.control),
            ("snapshot", &self.snapshot),
            ("field", &self.field),
        ]
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CalibrationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_default_grid_is_reference_domain() {
        let grid = CalibrationConfig::default().grid_spec().unwrap();
        assert_eq!((grid.nrow(), grid.ncol()), (80, 50));
        assert_eq!(grid.bounds(), (-250.0, 250.0, -400.0, 400.0));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = CalibrationConfig::default();
        config.control.noptmax = 12;
        config.variogram.fit = false;
        config.variogram.sill = Some(2.0);
        config.variogram.range = Some(150.0);
        let text = config.to_toml().unwrap();
        let back = CalibrationConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = CalibrationConfig::from_toml_str(
            "[grid]\nnrow = 20\nncol = 10\n[sampling]\nnx = 2\nny = 3\nmargin_x = 10.0\nmargin_y = 10.0\n",
        )
        .unwrap();
        assert_eq!(config.grid.nrow, 20);
        assert_eq!(config.grid.delr, 10.0);
        assert_eq!(config.control.rlambda1, 10.0);
        assert_eq!(config.files.command, "model.bat");
    }

    #[test]
    fn test_explicit_spacings_and_origin() {
        let grid = GridConfig {
            nrow: 2,
            ncol: 3,
            row_spacings: Some(vec![5.0, 15.0]),
            col_spacings: Some(vec![1.0, 2.0, 3.0]),
            x_origin: Some(100.0),
            y_origin: Some(50.0),
            ..Default::default()
        }
        .to_grid_spec()
        .unwrap();
        assert_eq!(grid.bounds(), (100.0, 106.0, 30.0, 50.0));
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = CalibrationConfig::default();
        config.grid.delr = 0.0;
        config.parameters.lower = 60.0;
        config.observations.weight = -1.0;
        config.variogram.fit = false;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.starts_with("grid:")), "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("parameters.lower")), "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("observations.weight")), "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("variogram.sill")), "{errors:?}");
    }

    #[test]
    fn test_spacing_count_mismatch_rejected() {
        let mut config = CalibrationConfig::default();
        config.grid.row_spacings = Some(vec![10.0; 3]);
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.contains("row_spacings has 3 entries")));
    }

    #[test]
    fn test_long_prefix_rejected() {
        let mut config = CalibrationConfig::default();
        config.parameters.prefix = "conductivity".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_log_transform_needs_positive_lower_bound() {
        let mut config = CalibrationConfig::default();
        config.parameters.transform = ParTransform::Log;
        config.parameters.lower = 0.0;
        config.parameters.initial = 1.0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.contains("log-transformed")));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.toml");
        let mut config = CalibrationConfig::default();
        config.files.command = "run_model.sh".to_string();
        config.save_to_file(&path).unwrap();
        let loaded = CalibrationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.files.command, "run_model.sh");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[grid\nnrow = 1").unwrap();
        match CalibrationConfig::load_from_file(&path) {
            Err(ConfigError::Parse(p, _)) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
