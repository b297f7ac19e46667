//! Fixed-schema parameter and observation records for the optimizer files.

use serde::{Deserialize, Serialize};

/// How the optimizer treats a parameter during estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParTransform {
    #[default]
    None,
    Log,
    Fixed,
    /// Tied to `parent`; its ratio to the parent is held at the initial ratio.
    Tied { parent: String },
}

impl ParTransform {
    /// Control-file keyword.
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Log => "log",
            Self::Fixed => "fixed",
            Self::Tied { .. } => "tied",
        }
    }

    pub const fn is_adjustable(&self) -> bool {
        matches!(self, Self::None | Self::Log)
    }
}

/// Whether per-iteration changes are limited relative to the value or by factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLimit {
    #[default]
    Relative,
    Factor,
}

impl ChangeLimit {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Factor => "factor",
        }
    }
}

/// One estimable parameter (one per pilot point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub initial: f64,
    pub lower: f64,
    pub upper: f64,
    pub group: String,
    #[serde(default)]
    pub transform: ParTransform,
    #[serde(default)]
    pub change_limit: ChangeLimit,
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

const fn unit_scale() -> f64 {
    1.0
}

/// One measured quantity paired with a simulator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub group: String,
}

/// Values applied to every generated `ParameterRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDefaults {
    /// Prefix of generated parameter names (`hk0102` for row 1, column 2).
    pub prefix: String,
    pub initial: f64,
    pub lower: f64,
    pub upper: f64,
    pub group: String,
    pub transform: ParTransform,
    pub change_limit: ChangeLimit,
    pub scale: f64,
    pub offset: f64,
}

impl Default for ParameterDefaults {
    fn default() -> Self {
        Self {
            prefix: "hk".to_string(),
            initial: 5.0,
            lower: 0.0001,
            upper: 50.0,
            group: "hk".to_string(),
            transform: ParTransform::None,
            change_limit: ChangeLimit::Relative,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl ParameterDefaults {
    pub fn record(&self, name: impl Into<String>) -> ParameterRecord {
        ParameterRecord {
            name: name.into(),
            initial: self.initial,
            lower: self.lower,
            upper: self.upper,
            group: self.group.clone(),
            transform: self.transform.clone(),
            change_limit: self.change_limit,
            scale: self.scale,
            offset: self.offset,
        }
    }
}

/// Values applied to every generated `ObservationRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationDefaults {
    pub prefix: String,
    pub weight: f64,
    pub group: String,
}

impl Default for ObservationDefaults {
    fn default() -> Self {
        Self {
            prefix: "obs".to_string(),
            weight: 1.0,
            group: "heads".to_string(),
        }
    }
}

impl ObservationDefaults {
    pub fn record(&self, name: impl Into<String>, value: f64) -> ObservationRecord {
        ObservationRecord {
            name: name.into(),
            value,
            weight: self.weight,
            group: self.group.clone(),
        }
    }
}
