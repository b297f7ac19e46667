//! Variogram models, empirical semivariograms and least-squares fitting
//!
//! The three closed-form families share the parameterization
//! `{sill, range, nugget}` where `sill` is the structured (partial) sill and
//! the total plateau is `sill + nugget`:
//!
//! - spherical:   `sill * (1.5 h/a - 0.5 (h/a)^3) + nugget` for `h < a`, else `sill + nugget`
//! - exponential: `sill * (1 - exp(-h/a)) + nugget`
//! - gaussian:    `sill * (1 - exp(-(h/a)^2)) + nugget`
//!
//! `semivariance(0) = 0`: the nugget only applies at non-zero separation, which
//! keeps kriging an exact interpolator at the data points.

use argmin::core::{CostFunction, Error as ArgminError, Executor, State};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::Point;

/// Number of distance bins used for the empirical semivariogram by default.
pub const DEFAULT_NLAGS: usize = 6;

/// Minimum non-empty lag bins required to fit three parameters.
pub const MIN_LAGS_FOR_FIT: usize = 3;

/// Iteration cap for the Nelder-Mead fit.
const MAX_FIT_ITERS: u64 = 2_000;

/// Floor applied to the fitted range so the model stays valid.
const MIN_FIT_RANGE: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum VariogramError {
    #[error("Invalid variogram parameter: {0}")]
    InvalidParameter(String),

    #[error("Not enough lag bins to fit a variogram: have {0}, need {1}")]
    InsufficientLags(usize, usize),

    #[error("Variogram fit failed: {0}")]
    FitFailed(String),
}

/// Variogram model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariogramKind {
    #[default]
    Spherical,
    Exponential,
    Gaussian,
}

impl std::fmt::Display for VariogramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spherical => write!(f, "spherical"),
            Self::Exponential => write!(f, "exponential"),
            Self::Gaussian => write!(f, "gaussian"),
        }
    }
}

impl std::str::FromStr for VariogramKind {
    type Err = VariogramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spherical" => Ok(Self::Spherical),
            "exponential" => Ok(Self::Exponential),
            "gaussian" => Ok(Self::Gaussian),
            other => Err(VariogramError::InvalidParameter(format!(
                "unknown variogram model '{other}'"
            ))),
        }
    }
}

/// Model family plus `{sill, range, nugget}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariogramParameters {
    pub kind: VariogramKind,
    pub sill: f64,
    pub range: f64,
    pub nugget: f64,
}

impl VariogramParameters {
    pub const fn new(kind: VariogramKind, sill: f64, range: f64, nugget: f64) -> Self {
        Self {
            kind,
            sill,
            range,
            nugget,
        }
    }

    pub fn validate(&self) -> Result<(), VariogramError> {
        let Self {
            sill,
            range,
            nugget,
            ..
        } = *self;
        if !sill.is_finite() || sill < 0.0 {
            return Err(VariogramError::InvalidParameter(format!(
                "sill = {sill} must be finite and >= 0"
            )));
        }
        if !range.is_finite() || range <= 0.0 {
            return Err(VariogramError::InvalidParameter(format!(
                "range = {range} must be finite and > 0"
            )));
        }
        if !nugget.is_finite() || nugget < 0.0 {
            return Err(VariogramError::InvalidParameter(format!(
                "nugget = {nugget} must be finite and >= 0"
            )));
        }
        if nugget > sill {
            return Err(VariogramError::InvalidParameter(format!(
                "nugget = {nugget} must not exceed sill = {sill}"
            )));
        }
        Ok(())
    }
}

/// A validated variogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariogramModel {
    params: VariogramParameters,
}

impl VariogramModel {
    pub fn new(params: VariogramParameters) -> Result<Self, VariogramError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub const fn parameters(&self) -> &VariogramParameters {
        &self.params
    }

    pub const fn sill(&self) -> f64 {
        self.params.sill
    }

    /// Semivariance at separation `h >= 0`.
    pub fn semivariance(&self, h: f64) -> f64 {
        structured_semivariance(&self.params, h)
    }

    /// `sill - semivariance(h)`.
    pub fn covariance(&self, h: f64) -> f64 {
        self.params.sill - self.semivariance(h)
    }
}

fn structured_semivariance(p: &VariogramParameters, h: f64) -> f64 {
    if h <= 0.0 {
        return 0.0;
    }
    let r = h / p.range;
    let shape = match p.kind {
        VariogramKind::Spherical => {
            if h < p.range {
                1.5 * r - 0.5 * r.powi(3)
            } else {
                1.0
            }
        }
        VariogramKind::Exponential => 1.0 - (-r).exp(),
        VariogramKind::Gaussian => 1.0 - (-(r * r)).exp(),
    };
    p.sill * shape + p.nugget
}

// ============================================================================
// Empirical Semivariogram
// ============================================================================

/// Binned experimental semivariogram.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalVariogram {
    /// Mean separation of the pairs in each non-empty bin.
    pub lags: Vec<f64>,
    /// Mean of `0.5 * (z_i - z_j)^2` in each non-empty bin.
    pub semivariance: Vec<f64>,
    /// Number of pairs in each non-empty bin.
    pub counts: Vec<usize>,
}

impl EmpiricalVariogram {
    /// Bin all sample pairs into `nlags` equal-width distance classes spanning
    /// the minimum to maximum pair separation. Empty bins are dropped.
    pub fn compute(samples: &[(Point, f64)], nlags: usize) -> Self {
        let mut pairs: Vec<(f64, f64)> = Vec::new();
        for (i, (pi, zi)) in samples.iter().enumerate() {
            for (pj, zj) in &samples[i + 1..] {
                pairs.push((pi.distance_xy(pj), 0.5 * (zi - zj).powi(2)));
            }
        }

        let mut out = Self {
            lags: Vec::new(),
            semivariance: Vec::new(),
            counts: Vec::new(),
        };
        if pairs.is_empty() || nlags == 0 {
            return out;
        }

        let dmin = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let dmax = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let width = (dmax - dmin) / nlags as f64;

        let mut sum_d = vec![0.0; nlags];
        let mut sum_g = vec![0.0; nlags];
        let mut counts = vec![0usize; nlags];
        for (d, g) in pairs {
            let bin = if width > 0.0 {
                (((d - dmin) / width) as usize).min(nlags - 1)
            } else {
                0
            };
            sum_d[bin] += d;
            sum_g[bin] += g;
            counts[bin] += 1;
        }

        for bin in 0..nlags {
            if counts[bin] > 0 {
                let n = counts[bin] as f64;
                out.lags.push(sum_d[bin] / n);
                out.semivariance.push(sum_g[bin] / n);
                out.counts.push(counts[bin]);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }
}

// ============================================================================
// Least-Squares Fit
// ============================================================================

/// Sum of squared residuals between a model and the empirical points, each
/// weighted by the number of pairs in its bin.
struct VariogramFitProblem<'a> {
    kind: VariogramKind,
    empirical: &'a EmpiricalVariogram,
}

/// Map an unconstrained search point onto valid parameters:
/// `sill, nugget >= 0`, `range > 0`, `nugget <= sill`.
fn project(kind: VariogramKind, p: &[f64]) -> VariogramParameters {
    let sill = p[0].abs();
    VariogramParameters {
        kind,
        sill,
        range: p[1].abs().max(MIN_FIT_RANGE),
        nugget: p[2].abs().min(sill),
    }
}

impl CostFunction for VariogramFitProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, ArgminError> {
        let params = project(self.kind, p);
        Ok(self
            .empirical
            .lags
            .iter()
            .zip(&self.empirical.semivariance)
            .zip(&self.empirical.counts)
            .map(|((&h, &g), &n)| n as f64 * (structured_semivariance(&params, h) - g).powi(2))
            .sum())
    }
}

/// Fit `{sill, range, nugget}` of the given family to an empirical variogram.
///
/// Pair-count weighted least squares minimised with Nelder-Mead; parameters are kept at
/// or above zero by reflection and the nugget is capped at the sill.
pub fn fit_variogram(
    empirical: &EmpiricalVariogram,
    kind: VariogramKind,
) -> Result<VariogramParameters, VariogramError> {
    if empirical.len() < MIN_LAGS_FOR_FIT {
        return Err(VariogramError::InsufficientLags(
            empirical.len(),
            MIN_LAGS_FOR_FIT,
        ));
    }

    let gmax = empirical.semivariance.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let gmin = empirical.semivariance.iter().copied().fold(f64::INFINITY, f64::min);
    let hmax = empirical.lags.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let initial = vec![gmax - gmin, 0.25 * hmax, gmin];

    // Initial simplex: the guess plus one vertex per coordinate nudged by 5%
    let mut simplex = vec![initial.clone()];
    for i in 0..initial.len() {
        let mut vertex = initial.clone();
        vertex[i] = if vertex[i].abs() > 0.0 {
            vertex[i] * 1.05
        } else {
            0.000_25
        };
        simplex.push(vertex);
    }

    let problem = VariogramFitProblem { kind, empirical };
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(1e-12)
        .map_err(|e| VariogramError::FitFailed(e.to_string()))?;
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(MAX_FIT_ITERS))
        .run()
        .map_err(|e| VariogramError::FitFailed(e.to_string()))?;

    let best = result
        .state()
        .get_best_param()
        .cloned()
        .ok_or_else(|| VariogramError::FitFailed("solver returned no parameters".to_string()))?;
    let fitted = project(kind, &best);
    debug!(
        kind = %fitted.kind,
        sill = fitted.sill,
        range = fitted.range,
        nugget = fitted.nugget,
        iterations = result.state().get_iter(),
        "Variogram fitted"
    );
    fitted.validate()?;
    Ok(fitted)
}
