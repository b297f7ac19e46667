//! Ordinary kriging
//!
//! Builds the `(n+1) x (n+1)` ordinary-kriging system once per sample set:
//!
//! ```text
//! | C(h_11) ... C(h_1n)  1 |   | w_1 |   | C(h_10) |
//! |   ...        ...    ...| x | ... | = |   ...   |
//! | C(h_n1) ... C(h_nn)  1 |   | w_n |   | C(h_n0) |
//! |   1     ...   1      0 |   |  mu |   |    1    |
//! ```
//!
//! The LU factorization of the left-hand side depends only on sample geometry
//! and is reused for every target. Estimates are `sum(w_i z_i)`; the kriging
//! variance is `sill - w . c - mu`.

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use thiserror::Error;
use tracing::{debug, warn};

use crate::grid::{GridCellLocator, GridError};
use crate::types::{GridArray, GridSpec, InterpolatedField, Point};

use super::variogram::{VariogramError, VariogramModel, VariogramParameters};

/// Separation below which two samples are treated as the same location.
const DUPLICATE_DISTANCE: f64 = 1e-9;

/// Smallest accepted ratio between the smallest and largest LU pivot.
const MIN_PIVOT_RATIO: f64 = 1e-12;

/// Targets solved per batched right-hand side.
const SOLVE_BATCH: usize = 4_096;

#[derive(Debug, Error)]
pub enum KrigingError {
    #[error(transparent)]
    Variogram(#[from] VariogramError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Invalid sample {index}: {reason}")]
    InvalidSample { index: usize, reason: String },

    #[error("Insufficient samples: {distinct} distinct location(s), need at least 2")]
    InsufficientSamples { distinct: usize },

    #[error("Singular kriging system: {0}")]
    SingularSystem(String),
}

/// Kriged estimate at one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f64,
    pub variance: f64,
    /// The raw variance was negative (round-off) and has been set to zero.
    pub variance_clamped: bool,
}

impl Prediction {
    /// Prediction from a raw kriging variance; round-off below zero is
    /// clamped to zero and flagged.
    fn new(value: f64, raw_variance: f64) -> Self {
        Self {
            value,
            variance: raw_variance.max(0.0),
            variance_clamped: raw_variance < 0.0,
        }
    }
}

/// Solution of the kriging system for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct KrigingWeights {
    pub weights: Vec<f64>,
    pub lagrange: f64,
}

/// Factored ordinary-kriging system for a fixed sample set.
#[derive(Debug, Clone)]
pub struct OrdinaryKriging {
    locations: Vec<Point>,
    values: Vec<f64>,
    model: VariogramModel,
    lu: LU<f64, Dyn, Dyn>,
}

impl OrdinaryKriging {
    /// Assemble and factor the kriging system.
    pub fn new(samples: &[(Point, f64)], params: VariogramParameters) -> Result<Self, KrigingError> {
        let model = VariogramModel::new(params)?;

        for (index, (p, z)) in samples.iter().enumerate() {
            if !p.x.is_finite() || !p.y.is_finite() || !z.is_finite() {
                return Err(KrigingError::InvalidSample {
                    index,
                    reason: format!("non-finite sample ({}, {}) = {z}", p.x, p.y),
                });
            }
        }

        let locations: Vec<Point> = samples.iter().map(|(p, _)| *p).collect();
        let values: Vec<f64> = samples.iter().map(|(_, z)| *z).collect();

        let mut distinct = 0;
        let mut duplicate: Option<Point> = None;
        for (i, p) in locations.iter().enumerate() {
            if locations[..i]
                .iter()
                .any(|q| p.distance_xy(q) <= DUPLICATE_DISTANCE)
            {
                duplicate.get_or_insert(*p);
            } else {
                distinct += 1;
            }
        }
        if distinct < 2 {
            return Err(KrigingError::InsufficientSamples { distinct });
        }
        if let Some(p) = duplicate {
            return Err(KrigingError::SingularSystem(format!(
                "duplicate sample location ({}, {})",
                p.x, p.y
            )));
        }

        let n = locations.len();
        let lhs = DMatrix::from_fn(n + 1, n + 1, |i, j| match (i < n, j < n) {
            (true, true) => model.covariance(locations[i].distance_xy(&locations[j])),
            (false, false) => 0.0,
            _ => 1.0,
        });
        let lu = lhs.lu();

        let pivots = lu.u().diagonal();
        let max_pivot = pivots.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let min_pivot = pivots.iter().fold(f64::INFINITY, |m, v| m.min(v.abs()));
        if !lu.is_invertible() || !(min_pivot > max_pivot * MIN_PIVOT_RATIO) {
            return Err(KrigingError::SingularSystem(format!(
                "pivot ratio {:.3e} below {MIN_PIVOT_RATIO:e}",
                min_pivot / max_pivot
            )));
        }

        debug!(samples = n, kind = %params.kind, "Kriging system factored");
        Ok(Self {
            locations,
            values,
            model,
            lu,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.locations.len()
    }

    pub const fn model(&self) -> &VariogramModel {
        &self.model
    }

    fn rhs(&self, target: &Point) -> DVector<f64> {
        let n = self.locations.len();
        DVector::from_fn(n + 1, |i, _| {
            if i < n {
                self.model.covariance(self.locations[i].distance_xy(target))
            } else {
                1.0
            }
        })
    }

    /// Kriging weights and Lagrange multiplier for one target.
    pub fn weights(&self, target: &Point) -> Result<KrigingWeights, KrigingError> {
        let n = self.locations.len();
        let solution = self
            .lu
            .solve(&self.rhs(target))
            .ok_or_else(|| KrigingError::SingularSystem("solve failed".to_string()))?;
        Ok(KrigingWeights {
            weights: solution.rows(0, n).iter().copied().collect(),
            lagrange: solution[n],
        })
    }

    /// Estimate at one target.
    pub fn predict(&self, target: &Point) -> Result<Prediction, KrigingError> {
        Ok(self
            .predict_many(std::slice::from_ref(target))?
            .into_iter()
            .next()
            .unwrap_or(Prediction {
                value: f64::NAN,
                variance: f64::NAN,
                variance_clamped: false,
            }))
    }

    /// Estimate at many targets, solving batched right-hand sides against the
    /// shared factorization.
    pub fn predict_many(&self, targets: &[Point]) -> Result<Vec<Prediction>, KrigingError> {
        let n = self.locations.len();
        let sill = self.model.sill();
        let mut out = Vec::with_capacity(targets.len());

        for chunk in targets.chunks(SOLVE_BATCH) {
            let rhs = DMatrix::from_fn(n + 1, chunk.len(), |i, j| {
                if i < n {
                    self.model.covariance(self.locations[i].distance_xy(&chunk[j]))
                } else {
                    1.0
                }
            });
            let solution = self
                .lu
                .solve(&rhs)
                .ok_or_else(|| KrigingError::SingularSystem("batched solve failed".to_string()))?;

            for j in 0..chunk.len() {
                let x = solution.column(j);
                let b = rhs.column(j);
                let mut value = 0.0;
                let mut explained = 0.0;
                for i in 0..n {
                    value += x[i] * self.values[i];
                    explained += x[i] * b[i];
                }
                let raw_variance = sill - explained - x[n];
                if !value.is_finite() || !raw_variance.is_finite() {
                    return Err(KrigingError::SingularSystem(format!(
                        "non-finite estimate at ({}, {})",
                        chunk[j].x, chunk[j].y
                    )));
                }
                out.push(Prediction::new(value, raw_variance));
            }
        }
        Ok(out)
    }

    /// Estimate at every cell centre of `grid`.
    pub fn predict_grid(&self, grid: &GridSpec) -> Result<InterpolatedField, KrigingError> {
        let locator = GridCellLocator::new(grid)?;
        let (nrow, ncol) = (grid.nrow(), grid.ncol());
        let predictions = self.predict_many(&locator.cell_centers())?;
        let field = assemble_field(nrow, ncol, &predictions);
        debug!(nrow, ncol, samples = self.sample_count(), "Kriged full grid");
        Ok(field)
    }
}

/// Lay row-major cell predictions out as a field, listing clamped cells.
fn assemble_field(nrow: usize, ncol: usize, predictions: &[Prediction]) -> InterpolatedField {
    let mut values = GridArray::filled(nrow, ncol, 0.0);
    let mut variance = GridArray::filled(nrow, ncol, 0.0);
    let mut clamped_cells = Vec::new();
    for (k, p) in predictions.iter().enumerate() {
        let (row, col) = (k / ncol, k % ncol);
        values.values[k] = p.value;
        variance.values[k] = p.variance;
        if p.variance_clamped {
            clamped_cells.push((row, col));
        }
    }

    if !clamped_cells.is_empty() {
        warn!(
            cells = clamped_cells.len(),
            "Negative kriging variance clamped to zero"
        );
    }
    InterpolatedField {
        values,
        variance,
        clamped_cells,
    }
}

/// Krige `samples` with `params` and estimate at each of `targets`.
pub fn fit_and_predict(
    samples: &[(Point, f64)],
    params: VariogramParameters,
    targets: &[Point],
) -> Result<Vec<Prediction>, KrigingError> {
    OrdinaryKriging::new(samples, params)?.predict_many(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geostat::VariogramKind;

    fn triangle() -> Vec<(Point, f64)> {
        vec![
            (Point::planar(0.0, 0.0), 1.0),
            (Point::planar(10.0, 0.0), 2.0),
            (Point::planar(0.0, 10.0), 3.0),
        ]
    }

    fn spherical() -> VariogramParameters {
        VariogramParameters::new(VariogramKind::Spherical, 1.0, 20.0, 0.0)
    }

    fn scattered() -> Vec<(Point, f64)> {
        (0..12)
            .map(|i| {
                let t = f64::from(i);
                let p = Point::planar(7.0 * t % 31.0, 13.0 * t % 29.0);
                (p, (0.2 * p.x).sin() + 0.1 * p.y)
            })
            .collect()
    }

    #[test]
    fn test_exact_at_sample_location() {
        let out = fit_and_predict(&triangle(), spherical(), &[Point::planar(0.0, 0.0)]).unwrap();
        assert!((out[0].value - 1.0).abs() < 1e-10);
        assert!(out[0].variance.abs() < 1e-10);
    }

    #[test]
    fn test_exact_at_every_sample_for_every_model() {
        let samples = scattered();
        for kind in [
            VariogramKind::Spherical,
            VariogramKind::Exponential,
            VariogramKind::Gaussian,
        ] {
            let params = VariogramParameters::new(kind, 2.0, 15.0, 0.0);
            let krige = OrdinaryKriging::new(&samples, params).unwrap();
            for (p, z) in &samples {
                let pred = krige.predict(p).unwrap();
                assert!((pred.value - z).abs() < 1e-6, "{kind}: {} vs {z}", pred.value);
                assert!(pred.variance < 1e-6, "{kind}: variance {}", pred.variance);
            }
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let samples = scattered();
        let krige = OrdinaryKriging::new(
            &samples,
            VariogramParameters::new(VariogramKind::Exponential, 1.5, 12.0, 0.2),
        )
        .unwrap();
        for target in [
            Point::planar(3.3, 4.4),
            Point::planar(-50.0, 80.0),
            Point::planar(15.0, 15.0),
            samples[4].0,
        ] {
            let w = krige.weights(&target).unwrap();
            assert_eq!(w.weights.len(), samples.len());
            let total: f64 = w.weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
        }
    }

    #[test]
    fn test_interior_estimate_is_bounded_and_uncertain() {
        let krige = OrdinaryKriging::new(&triangle(), spherical()).unwrap();
        let pred = krige.predict(&Point::planar(3.0, 3.0)).unwrap();
        assert!(pred.value > 1.0 && pred.value < 3.0);
        assert!(pred.variance > 0.0);
        assert!(!pred.variance_clamped);
    }

    #[test]
    fn test_negative_raw_variance_is_clamped_and_flagged() {
        let clamped = Prediction::new(2.5, -1e-12);
        assert_eq!(clamped.value, 2.5);
        assert_eq!(clamped.variance, 0.0);
        assert!(clamped.variance_clamped);

        let kept = Prediction::new(2.5, 0.25);
        assert_eq!(kept.variance, 0.25);
        assert!(!kept.variance_clamped);

        let zero = Prediction::new(2.5, 0.0);
        assert!(!zero.variance_clamped);
    }

    #[test]
    fn test_clamped_cells_listed_in_field() {
        let predictions = [
            Prediction::new(1.0, 0.5),
            Prediction::new(2.0, -1e-10),
            Prediction::new(3.0, 0.1),
            Prediction::new(4.0, 0.2),
            Prediction::new(5.0, 0.3),
            Prediction::new(6.0, -3e-14),
        ];
        let field = assemble_field(2, 3, &predictions);
        assert_eq!(field.clamped_cells, vec![(0, 1), (1, 2)]);
        assert_eq!(field.variance.get(0, 1), Some(0.0));
        assert_eq!(field.variance.get(1, 2), Some(0.0));
        assert_eq!(field.values.get(1, 0), Some(4.0));
        assert!(field.variance.values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_batched_matches_single() {
        let krige = OrdinaryKriging::new(&scattered(), spherical()).unwrap();
        let targets: Vec<Point> = (0..25)
            .map(|i| Point::planar(f64::from(i % 5) * 6.0, f64::from(i / 5) * 6.0))
            .collect();
        let batched = krige.predict_many(&targets).unwrap();
        for (t, b) in targets.iter().zip(&batched) {
            let single = krige.predict(t).unwrap();
            assert!((single.value - b.value).abs() < 1e-12);
            assert!((single.variance - b.variance).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let result = OrdinaryKriging::new(&triangle()[..1], spherical());
        assert!(matches!(
            result,
            Err(KrigingError::InsufficientSamples { distinct: 1 })
        ));
    }

    #[test]
    fn test_coincident_pair_is_insufficient() {
        let samples = vec![(Point::planar(1.0, 1.0), 1.0), (Point::planar(1.0, 1.0), 2.0)];
        assert!(matches!(
            OrdinaryKriging::new(&samples, spherical()),
            Err(KrigingError::InsufficientSamples { distinct: 1 })
        ));
    }

    #[test]
    fn test_duplicate_location_is_singular() {
        let mut samples = triangle();
        samples.push((Point::planar(10.0, 0.0), 2.5));
        assert!(matches!(
            OrdinaryKriging::new(&samples, spherical()),
            Err(KrigingError::SingularSystem(_))
        ));
    }

    #[test]
    fn test_zero_sill_is_singular() {
        let params = VariogramParameters::new(VariogramKind::Gaussian, 0.0, 10.0, 0.0);
        assert!(matches!(
            OrdinaryKriging::new(&triangle(), params),
            Err(KrigingError::SingularSystem(_))
        ));
    }

    #[test]
    fn test_invalid_variogram_is_reported() {
        let params = VariogramParameters::new(VariogramKind::Spherical, 1.0, 0.0, 0.0);
        assert!(matches!(
            OrdinaryKriging::new(&triangle(), params),
            Err(KrigingError::Variogram(VariogramError::InvalidParameter(_)))
        ));
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let mut samples = triangle();
        samples[1].1 = f64::NAN;
        assert!(matches!(
            OrdinaryKriging::new(&samples, spherical()),
            Err(KrigingError::InvalidSample { index: 1, .. })
        ));
    }

    #[test]
    fn test_predict_grid_honours_samples_at_cell_centres() {
        // 4 x 4 grid of 10 m cells centred on the origin; centres at ±5, ±15
        let grid = GridSpec::centered(4, 4, 10.0, 10.0, 0.0, -10.0).unwrap();
        let samples = vec![
            (Point::planar(-15.0, 15.0), 4.0),
            (Point::planar(15.0, 15.0), 8.0),
            (Point::planar(-5.0, -15.0), 2.0),
            (Point::planar(15.0, -5.0), 6.0),
        ];
        let krige = OrdinaryKriging::new(&samples, spherical()).unwrap();
        let field = krige.predict_grid(&grid).unwrap();
        assert_eq!(field.values.nrow, 4);
        assert_eq!(field.values.ncol, 4);
        assert!((field.values.get(0, 0).unwrap() - 4.0).abs() < 1e-9);
        assert!((field.values.get(0, 3).unwrap() - 8.0).abs() < 1e-9);
        assert!((field.values.get(3, 1).unwrap() - 2.0).abs() < 1e-9);
        assert!((field.values.get(2, 3).unwrap() - 6.0).abs() < 1e-9);
        assert!(field.variance.get(1, 1).unwrap() > 0.0);
        assert!(field.variance.values.iter().all(|v| *v >= 0.0));
    }
}
