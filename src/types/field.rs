//! Dense per-cell arrays over a grid.

use serde::{Deserialize, Serialize};

/// Row-major 2-D array keyed by `(row, col)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridArray {
    pub nrow: usize,
    pub ncol: usize,
    pub values: Vec<f64>,
}

impl GridArray {
    pub fn filled(nrow: usize, ncol: usize, value: f64) -> Self {
        Self {
            nrow,
            ncol,
            values: vec![value; nrow * ncol],
        }
    }

    /// Build from nested rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let nrow = rows.len();
        let ncol = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncol) {
            return None;
        }
        Some(Self {
            nrow,
            ncol,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// True when `values` holds exactly `nrow * ncol` entries.
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.nrow * self.ncol
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.nrow || col >= self.ncol {
            return None;
        }
        self.values.get(row * self.ncol + col).copied()
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        if row >= self.nrow || col >= self.ncol {
            return false;
        }
        match self.values.get_mut(row * self.ncol + col) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.ncol.max(1))
    }
}

/// Result of kriging onto a grid: estimates plus estimation variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedField {
    pub values: GridArray,
    pub variance: GridArray,
    /// Cells whose variance came out negative and was clamped to zero.
    #[serde(default)]
    pub clamped_cells: Vec<(usize, usize)>,
}
