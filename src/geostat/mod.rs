//! Geostatistics Module
//!
//! Variogram models and ordinary kriging for pilot-point interpolation.
//!
//! ## Components
//! - `VariogramModel` - spherical / exponential / gaussian semivariance
//! - `EmpiricalVariogram` + `fit_variogram()` - least-squares model fitting
//! - `OrdinaryKriging` - factor-once, solve-many kriging system
//!
//! ## Usage
//!
//! ```ignore
//! let params = VariogramParameters::new(VariogramKind::Spherical, 1.0, 20.0, 0.0);
//! let krige = OrdinaryKriging::new(&samples, params)?;
//! let field = krige.predict_grid(&grid)?;
//! ```

pub mod kriging;
pub mod variogram;

pub use kriging::{fit_and_predict, KrigingError, KrigingWeights, OrdinaryKriging, Prediction};
pub use variogram::{
    fit_variogram, EmpiricalVariogram, VariogramError, VariogramKind, VariogramModel,
    VariogramParameters, DEFAULT_NLAGS, MIN_LAGS_FOR_FIT,
};
