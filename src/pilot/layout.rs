//! Regular pilot-point layouts inset from the domain edges.

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::types::{GridSpec, Point};

/// `nx` by `ny` pilot points spread uniformly over the grid, `margin_x` and
/// `margin_y` world units in from the outer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingLayout {
    pub nx: usize,
    pub ny: usize,
    pub margin_x: f64,
    pub margin_y: f64,
}

impl Default for SamplingLayout {
    fn default() -> Self {
        Self {
            nx: 5,
            ny: 10,
            margin_x: 50.0,
            margin_y: 40.0,
        }
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5 * (start + end)],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

impl SamplingLayout {
    pub fn count(&self) -> usize {
        self.nx * self.ny
    }

    /// Pilot locations ordered row-major from the top (north) edge, at the
    /// mid-elevation of the top layer.
    pub fn points(&self, grid: &GridSpec) -> Result<Vec<Point>, StoreError> {
        grid.validate()?;
        if self.nx == 0 || self.ny == 0 {
            return Err(StoreError::InvalidLayout(format!(
                "layout {}x{} has no points",
                self.nx, self.ny
            )));
        }
        let (xmin, xmax, ymin, ymax) = grid.bounds();
        let fits = |margin: f64, extent: f64| margin.is_finite() && margin >= 0.0 && 2.0 * margin <= extent;
        if !fits(self.margin_x, xmax - xmin) || !fits(self.margin_y, ymax - ymin) {
            return Err(StoreError::InvalidLayout(format!(
                "margins ({}, {}) do not fit a {} x {} domain",
                self.margin_x,
                self.margin_y,
                xmax - xmin,
                ymax - ymin
            )));
        }

        let z = grid.layer_midpoint(0).unwrap_or(grid.top);
        let xs = linspace(xmin + self.margin_x, xmax - self.margin_x, self.nx);
        let ys = linspace(ymax - self.margin_y, ymin + self.margin_y, self.ny);
        Ok(ys
            .iter()
            .flat_map(|&y| xs.iter().map(move |&x| Point::new(x, y, z)))
            .collect())
    }
}
