//! Grid discretization types: `GridSpec`, `Point`, `CellAddress`.
//!
//! Conventions follow the usual finite-difference layout: the origin is the
//! upper-left corner of the model, rows advance southward (decreasing y),
//! columns advance eastward (increasing x) and layers advance downward from
//! `top` through each entry of `botm`.

use serde::{Deserialize, Serialize};

use crate::grid::GridError;

/// Length unit of the grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Undefined,
    Feet,
    #[default]
    Meters,
    Centimeters,
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Feet => write!(f, "feet"),
            Self::Meters => write!(f, "meters"),
            Self::Centimeters => write!(f, "centimeters"),
        }
    }
}

/// Rectilinear, axis-aligned grid with arbitrary (positive) spacings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Height of each row along y, north to south (one entry per row).
    pub row_spacings: Vec<f64>,
    /// Width of each column along x, west to east (one entry per column).
    pub col_spacings: Vec<f64>,
    /// World x of the upper-left corner.
    pub x_origin: f64,
    /// World y of the upper-left corner.
    pub y_origin: f64,
    /// Elevation of the top of layer 0.
    pub top: f64,
    /// Bottom elevation of each layer, top to bottom.
    pub botm: Vec<f64>,
    #[serde(default)]
    pub length_unit: LengthUnit,
}

impl GridSpec {
    /// Build and validate a grid.
    pub fn new(
        row_spacings: Vec<f64>,
        col_spacings: Vec<f64>,
        origin: (f64, f64),
        top: f64,
        botm: Vec<f64>,
        length_unit: LengthUnit,
    ) -> Result<Self, GridError> {
        let grid = Self {
            row_spacings,
            col_spacings,
            x_origin: origin.0,
            y_origin: origin.1,
            top,
            botm,
            length_unit,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Uniform single-layer grid centred on (0, 0), the layout used by the
    /// reference calibration models.
    pub fn centered(
        nrow: usize,
        ncol: usize,
        delc: f64,
        delr: f64,
        top: f64,
        bottom: f64,
    ) -> Result<Self, GridError> {
        let width = delr * ncol as f64;
        let height = delc * nrow as f64;
        Self::new(
            vec![delc; nrow],
            vec![delr; ncol],
            (-width / 2.0, height / 2.0),
            top,
            vec![bottom],
            LengthUnit::Meters,
        )
    }

    /// Check every structural invariant of the grid.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.row_spacings.is_empty() || self.col_spacings.is_empty() {
            return Err(GridError::InvalidParameter(
                "grid needs at least one row and one column".to_string(),
            ));
        }
        for (name, spacings) in [("row", &self.row_spacings), ("column", &self.col_spacings)] {
            if let Some((i, d)) = spacings
                .iter()
                .enumerate()
                .find(|(_, d)| !d.is_finite() || **d <= 0.0)
            {
                return Err(GridError::InvalidParameter(format!(
                    "{name} spacing {i} = {d} must be finite and > 0"
                )));
            }
        }
        if !self.x_origin.is_finite() || !self.y_origin.is_finite() || !self.top.is_finite() {
            return Err(GridError::InvalidParameter(
                "grid origin and top must be finite".to_string(),
            ));
        }
        if self.botm.is_empty() {
            return Err(GridError::InvalidParameter(
                "grid needs at least one layer bottom".to_string(),
            ));
        }
        let mut upper = self.top;
        for (k, &bottom) in self.botm.iter().enumerate() {
            if !bottom.is_finite() || bottom >= upper {
                return Err(GridError::InvalidParameter(format!(
                    "layer {k} bottom {bottom} must be finite and below its top {upper}"
                )));
            }
            upper = bottom;
        }
        Ok(())
    }

    pub fn nrow(&self) -> usize {
        self.row_spacings.len()
    }

    pub fn ncol(&self) -> usize {
        self.col_spacings.len()
    }

    pub fn nlay(&self) -> usize {
        self.botm.len()
    }

    /// Total extent along x.
    pub fn width(&self) -> f64 {
        self.col_spacings.iter().sum()
    }

    /// Total extent along y.
    pub fn height(&self) -> f64 {
        self.row_spacings.iter().sum()
    }

    /// Top elevation of layer `k`.
    pub fn layer_top(&self, k: usize) -> Option<f64> {
        if k >= self.nlay() {
            return None;
        }
        match k {
            0 => Some(self.top),
            _ => self.botm.get(k - 1).copied(),
        }
    }

    pub fn layer_bottom(&self, k: usize) -> Option<f64> {
        self.botm.get(k).copied()
    }

    /// Elevation halfway through layer `k`.
    pub fn layer_midpoint(&self, k: usize) -> Option<f64> {
        Some(0.5 * (self.layer_top(k)? + self.layer_bottom(k)?))
    }

    /// World bounding box as `(xmin, xmax, ymin, ymax)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.x_origin,
            self.x_origin + self.width(),
            self.y_origin - self.height(),
            self.y_origin,
        )
    }
}

/// A world-coordinate location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point for purely horizontal computations (z = 0).
    pub const fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Horizontal separation distance.
    pub fn distance_xy(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Discrete cell address plus fractional position inside the cell.
///
/// `(xloc, yloc, zloc) = (0, 0, 0)` is the cell's minimum corner (west,
/// south, bottom); `(1, 1, 1)` its maximum corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellAddress {
    pub row: usize,
    pub col: usize,
    #[serde(default)]
    pub layer: usize,
    #[serde(default = "half")]
    pub xloc: f64,
    #[serde(default = "half")]
    pub yloc: f64,
    #[serde(default = "half")]
    pub zloc: f64,
}

const fn half() -> f64 {
    0.5
}

impl CellAddress {
    /// Address of the centre of a cell.
    pub const fn center(row: usize, col: usize, layer: usize) -> Self {
        Self {
            row,
            col,
            layer,
            xloc: 0.5,
            yloc: 0.5,
            zloc: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_grid_bounds() {
        let grid = GridSpec::centered(80, 50, 10.0, 10.0, 0.0, -10.0).unwrap();
        let (xmin, xmax, ymin, ymax) = grid.bounds();
        assert_eq!(xmin, -250.0);
        assert_eq!(xmax, 250.0);
        assert_eq!(ymin, -400.0);
        assert_eq!(ymax, 400.0);
        assert_eq!(grid.nlay(), 1);
        assert_eq!(grid.layer_midpoint(0), Some(-5.0));
    }

    #[test]
    fn test_rejects_non_positive_spacing() {
        let result = GridSpec::new(
            vec![1.0, 0.0],
            vec![1.0],
            (0.0, 0.0),
            0.0,
            vec![-1.0],
            LengthUnit::Meters,
        );
        assert!(matches!(result, Err(GridError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_inverted_layers() {
        let result = GridSpec::new(
            vec![1.0],
            vec![1.0],
            (0.0, 0.0),
            0.0,
            vec![-5.0, -2.0],
            LengthUnit::Meters,
        );
        assert!(matches!(result, Err(GridError::InvalidParameter(_))));
    }

    #[test]
    fn test_layer_elevations() {
        let grid = GridSpec::new(
            vec![1.0],
            vec![1.0],
            (0.0, 0.0),
            10.0,
            vec![5.0, -5.0],
            LengthUnit::Feet,
        )
        .unwrap();
        assert_eq!(grid.layer_top(1), Some(5.0));
        assert_eq!(grid.layer_bottom(1), Some(-5.0));
        assert_eq!(grid.layer_top(2), None);
        assert_eq!(grid.layer_midpoint(1), Some(0.0));
        assert_eq!(grid.layer_midpoint(2), None);
    }

    #[test]
    fn test_cell_address_defaults_when_deserialized() {
        let cell: CellAddress = serde_json::from_str(r#"{"row": 3, "col": 4}"#).unwrap();
        assert_eq!(cell, CellAddress::center(3, 4, 0));
    }
}
