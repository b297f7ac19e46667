//! Control files (`pcf`)
//!
//! Sections are written in a fixed order:
//!
//! ```text
//! pcf
//! * control data
//! * parameter groups
//! * parameter data
//! * observation groups
//! * observation data
//! * model command line
//! * model input/output
//! ```
//!
//! Tuning constants come from `ControlSettings` and are written verbatim;
//! nothing in this module derives or adjusts them.

use std::path::PathBuf;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::{validate_names, ProtocolError, MAX_OBSERVATION_NAME, MAX_PARAMETER_NAME};
use crate::types::{ObservationRecord, ParTransform, ParameterRecord};

/// Longest group name the optimizer accepts.
const MAX_GROUP_NAME: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    Restart,
    #[default]
    NoRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PestMode {
    #[default]
    Estimation,
    Prediction,
    Regularisation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

/// Whether the decimal point may be omitted when writing model input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecimalPoint {
    #[default]
    Point,
    NoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncrementType {
    #[default]
    Relative,
    Absolute,
    RelToMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForcedCentral {
    #[default]
    Switch,
    #[serde(rename = "always_2")]
    Always2,
    #[serde(rename = "always_3")]
    Always3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeMethod {
    #[default]
    Parabolic,
    BestFit,
    OutsidePts,
}

impl RestartMode {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::NoRestart => "norestart",
        }
    }
}

impl PestMode {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Estimation => "estimation",
            Self::Prediction => "prediction",
            Self::Regularisation => "regularisation",
        }
    }
}

impl Precision {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }
}

impl DecimalPoint {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::NoPoint => "nopoint",
        }
    }
}

impl IncrementType {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
            Self::RelToMax => "rel_to_max",
        }
    }
}

impl ForcedCentral {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Always2 => "always_2",
            Self::Always3 => "always_3",
        }
    }
}

impl DerivativeMethod {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Parabolic => "parabolic",
            Self::BestFit => "best_fit",
            Self::OutsidePts => "outside_pts",
        }
    }
}

/// Finite-difference settings applied to every parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDerivativeSettings {
    pub inctyp: IncrementType,
    pub derinc: f64,
    pub derinclb: f64,
    pub forcen: ForcedCentral,
    pub derincmul: f64,
    pub dermthd: DerivativeMethod,
}

impl Default for GroupDerivativeSettings {
    fn default() -> Self {
        Self {
            inctyp: IncrementType::Relative,
            derinc: 0.01,
            derinclb: 0.0,
            forcen: ForcedCentral::Switch,
            derincmul: 1.5,
            dermthd: DerivativeMethod::Parabolic,
        }
    }
}

/// Parameter-change limits between iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeGroupSettings {
    /// Maximum relative change for relative-limited parameters.
    pub relparmax: f64,
    /// Maximum factor change for factor-limited parameters.
    pub facparmax: f64,
    /// Fraction of the initial value below which changes are measured
    /// against the initial value.
    pub facorig: f64,
    /// Iterations a parameter may sit on a bound before it is frozen there.
    pub iboundstick: u32,
}

impl Default for ChangeGroupSettings {
    fn default() -> Self {
        Self {
            relparmax: 10.0,
            facparmax: 10.0,
            facorig: 0.001,
            iboundstick: 4,
        }
    }
}

/// `* control data` constants plus the per-group derivative settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub rstfle: RestartMode,
    pub pestmode: PestMode,
    pub precis: Precision,
    pub dpoint: DecimalPoint,
    pub numcom: u32,
    pub jacfile: u32,
    pub messfile: u32,

    /// Initial Marquardt lambda.
    pub rlambda1: f64,
    /// Lambda adjustment factor.
    pub rlamfac: f64,
    pub phiratsuf: f64,
    pub phiredlam: f64,
    /// Lambdas tested per iteration.
    pub numlam: u32,
    /// Broyden Jacobian updates per iteration.
    pub jacupdate: u32,
    pub lamforgive: bool,
    pub derforgive: bool,

    pub change: ChangeGroupSettings,

    /// Objective-function reduction that switches to central derivatives.
    pub phiredswh: f64,

    /// Maximum optimisation iterations.
    pub noptmax: u32,
    pub phiredstp: f64,
    pub nphistp: u32,
    pub nphinored: u32,
    /// Relative parameter change below which the run stops ...
    pub relparstp: f64,
    /// ... once it has held for this many iterations.
    pub nrelpar: u32,

    pub icov: u32,
    pub icor: u32,
    pub ieig: u32,

    pub derivatives: GroupDerivativeSettings,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            rstfle: RestartMode::NoRestart,
            pestmode: PestMode::Estimation,
            precis: Precision::Single,
            dpoint: DecimalPoint::Point,
            numcom: 1,
            jacfile: 0,
            messfile: 0,
            rlambda1: 10.0,
            rlamfac: 2.0,
            phiratsuf: 0.3,
            phiredlam: 0.01,
            numlam: 5,
            jacupdate: 0,
            lamforgive: true,
            derforgive: true,
            change: ChangeGroupSettings::default(),
            phiredswh: 0.1,
            noptmax: 50,
            phiredstp: 0.005,
            nphistp: 4,
            nphinored: 3,
            relparstp: 0.005,
            nrelpar: 4,
            icov: 0,
            icor: 0,
            ieig: 0,
            derivatives: GroupDerivativeSettings::default(),
        }
    }
}

/// A protocol file and the model file it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePair {
    /// Template or instruction file.
    pub pest_file: PathBuf,
    /// Model input or output file.
    pub model_file: PathBuf,
}

impl FilePair {
    pub fn new(pest_file: impl Into<PathBuf>, model_file: impl Into<PathBuf>) -> Self {
        Self {
            pest_file: pest_file.into(),
            model_file: model_file.into(),
        }
    }
}

/// Everything written into one control file.
#[derive(Debug, Clone)]
pub struct ControlDocument<'a> {
    pub settings: &'a ControlSettings,
    pub parameters: &'a [ParameterRecord],
    pub observations: &'a [ObservationRecord],
    pub command_line: &'a str,
    pub templates: &'a [FilePair],
    pub instructions: &'a [FilePair],
}

fn real(v: f64) -> String {
    format!("{v:?}")
}

fn forgive(enabled: bool, keyword: &str) -> String {
    if enabled {
        keyword.to_string()
    } else {
        format!("no{keyword}")
    }
}

impl ControlDocument<'_> {
    /// Check records and file lists for everything the optimizer rejects.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        validate_names(
            "parameter",
            self.parameters.iter().map(|p| p.name.as_str()),
            MAX_PARAMETER_NAME,
        )?;
        validate_names(
            "observation",
            self.observations.iter().map(|o| o.name.as_str()),
            MAX_OBSERVATION_NAME,
        )?;
        for group in self.parameter_groups().into_iter().chain(self.observation_groups()) {
            validate_names("group", [group], MAX_GROUP_NAME)?;
        }

        for p in self.parameters {
            let invalid = |reason: String| ProtocolError::InvalidRecord {
                name: p.name.clone(),
                reason,
            };
            if ![p.initial, p.lower, p.upper, p.scale, p.offset]
                .iter()
                .all(|v| v.is_finite())
            {
                return Err(invalid("non-finite value".to_string()));
            }
            if !(p.lower <= p.initial && p.initial <= p.upper) {
                return Err(invalid(format!(
                    "initial value {} outside bounds [{}, {}]",
                    p.initial, p.lower, p.upper
                )));
            }
            if p.transform == ParTransform::Log && p.lower <= 0.0 {
                return Err(invalid("log-transformed parameter needs a positive lower bound".to_string()));
            }
            if p.scale == 0.0 {
                return Err(invalid("scale must be non-zero".to_string()));
            }
            if let ParTransform::Tied { parent } = &p.transform {
                let parent_record = self
                    .parameters
                    .iter()
                    .find(|q| q.name.eq_ignore_ascii_case(parent))
                    .ok_or_else(|| invalid(format!("tied to unknown parameter '{parent}'")))?;
                if parent_record.name.eq_ignore_ascii_case(&p.name) || !parent_record.transform.is_adjustable() {
                    return Err(invalid(format!(
                        "tied parent '{parent}' must be a different adjustable parameter"
                    )));
                }
            }
        }

        for o in self.observations {
            if !o.value.is_finite() || !o.weight.is_finite() || o.weight < 0.0 {
                return Err(ProtocolError::InvalidRecord {
                    name: o.name.clone(),
                    reason: format!("value {} / weight {} invalid", o.value, o.weight),
                });
            }
        }

        if self.command_line.trim().is_empty() {
            return Err(ProtocolError::InvalidRecord {
                name: "model command line".to_string(),
                reason: "empty".to_string(),
            });
        }
        if self.templates.is_empty() || self.instructions.is_empty() {
            return Err(ProtocolError::InvalidRecord {
                name: "model input/output".to_string(),
                reason: "at least one template and one instruction file are required".to_string(),
            });
        }
        Ok(())
    }

    /// Parameter groups in order of first use.
    pub fn parameter_groups(&self) -> IndexSet<&str> {
        self.parameters.iter().map(|p| p.group.as_str()).collect()
    }

    /// Observation groups in order of first use.
    pub fn observation_groups(&self) -> IndexSet<&str> {
        self.observations.iter().map(|o| o.group.as_str()).collect()
    }

    pub fn render(&self) -> Result<String, ProtocolError> {
        self.validate()?;
        let s = self.settings;
        let par_groups = self.parameter_groups();
        let obs_groups = self.observation_groups();
        let mut lines: Vec<String> = Vec::new();

        lines.push("pcf".to_string());
        lines.push("* control data".to_string());
        lines.push(format!("{} {}", s.rstfle.keyword(), s.pestmode.keyword()));
        lines.push(format!(
            "{} {} {} 0 {}",
            self.parameters.len(),
            self.observations.len(),
            par_groups.len(),
            obs_groups.len()
        ));
        lines.push(format!(
            "{} {} {} {} {} {} {}",
            self.templates.len(),
            self.instructions.len(),
            s.precis.keyword(),
            s.dpoint.keyword(),
            s.numcom,
            s.jacfile,
            s.messfile
        ));
        lines.push(format!(
            "{} {} {} {} {} {} {} {}",
            real(s.rlambda1),
            real(s.rlamfac),
            real(s.phiratsuf),
            real(s.phiredlam),
            s.numlam,
            s.jacupdate,
            forgive(s.lamforgive, "lamforgive"),
            forgive(s.derforgive, "derforgive")
        ));
        lines.push(format!(
            "{} {} {} {}",
            real(s.change.relparmax),
            real(s.change.facparmax),
            real(s.change.facorig),
            s.change.iboundstick
        ));
        lines.push(real(s.phiredswh));
        lines.push(format!(
            "{} {} {} {} {} {}",
            s.noptmax,
            real(s.phiredstp),
            s.nphistp,
            s.nphinored,
            real(s.relparstp),
            s.nrelpar
        ));
        lines.push(format!("{} {} {}", s.icov, s.icor, s.ieig));

        lines.push("* parameter groups".to_string());
        let d = &s.derivatives;
        for group in &par_groups {
            lines.push(format!(
                "{group} {} {} {} {} {} {}",
                d.inctyp.keyword(),
                real(d.derinc),
                real(d.derinclb),
                d.forcen.keyword(),
                real(d.derincmul),
                d.dermthd.keyword()
            ));
        }

        lines.push("* parameter data".to_string());
        for p in self.parameters {
            lines.push(format!(
                "{} {} {} {} {} {} {} {} {} 1",
                p.name,
                p.transform.keyword(),
                p.change_limit.keyword(),
                real(p.initial),
                real(p.lower),
                real(p.upper),
                p.group,
                real(p.scale),
                real(p.offset)
            ));
        }
        for p in self.parameters {
            if let ParTransform::Tied { parent } = &p.transform {
                lines.push(format!("{} {parent}", p.name));
            }
        }

        lines.push("* observation groups".to_string());
        lines.extend(obs_groups.iter().map(|g| g.to_string()));

        lines.push("* observation data".to_string());
        for o in self.observations {
            lines.push(format!("{} {} {} {}", o.name, real(o.value), real(o.weight), o.group));
        }

        lines.push("* model command line".to_string());
        lines.push(self.command_line.trim().to_string());

        lines.push("* model input/output".to_string());
        for pair in self.templates.iter().chain(self.instructions) {
            lines.push(format!(
                "{} {}",
                pair.pest_file.display(),
                pair.model_file.display()
            ));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}
