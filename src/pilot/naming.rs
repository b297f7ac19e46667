//! Pilot-point and observation naming.
//!
//! Names encode the 0-based cell: `hk0104` is row 1, column 4. Indices are
//! zero-padded to at least two digits, more on grids with 100+ rows or columns.

use serde::{Deserialize, Serialize};

use crate::types::GridSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotNaming {
    pub parameter_prefix: String,
    pub observation_prefix: String,
    /// Digits per index.
    pub index_width: usize,
}

impl Default for PilotNaming {
    fn default() -> Self {
        Self {
            parameter_prefix: "hk".to_string(),
            observation_prefix: "obs".to_string(),
            index_width: 2,
        }
    }
}

impl PilotNaming {
    /// Naming sized for `grid`.
    pub fn for_grid(
        parameter_prefix: impl Into<String>,
        observation_prefix: impl Into<String>,
        grid: &GridSpec,
    ) -> Self {
        let largest = grid.nrow().max(grid.ncol()).saturating_sub(1);
        Self {
            parameter_prefix: parameter_prefix.into(),
            observation_prefix: observation_prefix.into(),
            index_width: largest.to_string().len().max(2),
        }
    }

    pub fn parameter_name(&self, row: usize, col: usize) -> String {
        self.encode(&self.parameter_prefix, row, col)
    }

    pub fn observation_name(&self, row: usize, col: usize) -> String {
        self.encode(&self.observation_prefix, row, col)
    }

    fn encode(&self, prefix: &str, row: usize, col: usize) -> String {
        format!("{prefix}{row:0w$}{col:0w$}", w = self.index_width)
    }
}
