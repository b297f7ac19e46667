//! Grid cell locator
//!
//! Binary-searches cumulative spacing arrays to find the cell enclosing a world
//! point, then expresses the point in fractional cell-local coordinates.
//!
//! ## Edge policy
//!
//! A point lying exactly on a shared cell face resolves to the lower-index
//! cell (the northern row, the western column, the upper layer). Points on the
//! outer boundary belong to the adjacent edge cell. Anything beyond the
//! outer boundary is `OutOfDomain`; nothing is clamped.

use crate::types::{CellAddress, GridSpec, Point};

use super::GridError;

/// World-coordinate extent of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zbot: f64,
    pub ztop: f64,
}

impl CellBounds {
    /// Plan-view corners, clockwise from the upper-left.
    pub const fn vertices(&self) -> [(f64, f64); 4] {
        [
            (self.xmin, self.ymax),
            (self.xmax, self.ymax),
            (self.xmax, self.ymin),
            (self.xmin, self.ymin),
        ]
    }

    pub fn center(&self) -> (f64, f64) {
        (0.5 * (self.xmin + self.xmax), 0.5 * (self.ymin + self.ymax))
    }
}

/// Precomputed cumulative offsets for one grid.
///
/// Offsets are measured from the upper-left corner: eastward for columns,
/// southward for rows, downward from `top` for layers. Each edge array holds
/// `n + 1` monotonically increasing entries starting at 0.
#[derive(Debug, Clone)]
pub struct GridCellLocator {
    x_origin: f64,
    y_origin: f64,
    top: f64,
    col_edges: Vec<f64>,
    row_edges: Vec<f64>,
    layer_edges: Vec<f64>,
}

fn cumulative(spacings: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut edges = vec![0.0];
    let mut total = 0.0;
    for d in spacings {
        total += d;
        edges.push(total);
    }
    edges
}

/// Index of the interval of `edges` containing `offset`, lower index on ties.
///
/// Returns `None` when the offset is outside `[edges[0], edges[n]]` or NaN.
fn axis_index(edges: &[f64], offset: f64) -> Option<usize> {
    let last = *edges.last()?;
    if !(offset >= 0.0 && offset <= last) {
        return None;
    }
    let interior = &edges[1..edges.len() - 1];
    Some(interior.partition_point(|&e| e < offset))
}

impl GridCellLocator {
    pub fn new(grid: &GridSpec) -> Result<Self, GridError> {
        grid.validate()?;
        let mut upper = grid.top;
        let thicknesses: Vec<f64> = grid
            .botm
            .iter()
            .map(|&bottom| {
                let dz = upper - bottom;
                upper = bottom;
                dz
            })
            .collect();
        Ok(Self {
            x_origin: grid.x_origin,
            y_origin: grid.y_origin,
            top: grid.top,
            col_edges: cumulative(grid.col_spacings.iter().copied()),
            row_edges: cumulative(grid.row_spacings.iter().copied()),
            layer_edges: cumulative(thicknesses),
        })
    }

    pub fn nrow(&self) -> usize {
        self.row_edges.len() - 1
    }

    pub fn ncol(&self) -> usize {
        self.col_edges.len() - 1
    }

    pub fn nlay(&self) -> usize {
        self.layer_edges.len() - 1
    }

    /// World extent of cell `(row, col, layer)`.
    pub fn cell_bounds(&self, row: usize, col: usize, layer: usize) -> Option<CellBounds> {
        if row >= self.nrow() || col >= self.ncol() || layer >= self.nlay() {
            return None;
        }
        Some(CellBounds {
            xmin: self.x_origin + self.col_edges[col],
            xmax: self.x_origin + self.col_edges[col + 1],
            ymin: self.y_origin - self.row_edges[row + 1],
            ymax: self.y_origin - self.row_edges[row],
            zbot: self.top - self.layer_edges[layer + 1],
            ztop: self.top - self.layer_edges[layer],
        })
    }

    /// Plan-view centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        self.cell_bounds(row, col, 0).map(|b| b.center())
    }

    /// x of every column centre, west to east.
    pub fn x_centers(&self) -> Vec<f64> {
        self.col_edges
            .windows(2)
            .map(|w| self.x_origin + 0.5 * (w[0] + w[1]))
            .collect()
    }

    /// y of every row centre, north to south.
    pub fn y_centers(&self) -> Vec<f64> {
        self.row_edges
            .windows(2)
            .map(|w| self.y_origin - 0.5 * (w[0] + w[1]))
            .collect()
    }

    /// Every cell centre in row-major order.
    pub fn cell_centers(&self) -> Vec<Point> {
        let xs = self.x_centers();
        self.y_centers()
            .into_iter()
            .flat_map(|y| xs.iter().map(move |&x| Point::planar(x, y)))
            .collect()
    }

    /// Locate one point.
    pub fn locate_point(&self, point: &Point) -> Result<CellAddress, GridError> {
        let out_of_domain = || GridError::OutOfDomain {
            x: point.x,
            y: point.y,
            z: point.z,
        };
        let col = axis_index(&self.col_edges, point.x - self.x_origin).ok_or_else(out_of_domain)?;
        let row = axis_index(&self.row_edges, self.y_origin - point.y).ok_or_else(out_of_domain)?;
        let layer = axis_index(&self.layer_edges, self.top - point.z).ok_or_else(out_of_domain)?;
        let b = self.cell_bounds(row, col, layer).ok_or_else(out_of_domain)?;

        Ok(CellAddress {
            row,
            col,
            layer,
            xloc: 1.0 - (b.xmax - point.x) / (b.xmax - b.xmin),
            yloc: 1.0 - (b.ymax - point.y) / (b.ymax - b.ymin),
            zloc: 1.0 - (b.ztop - point.z) / (b.ztop - b.zbot),
        })
    }

    /// Locate a batch of points; the first out-of-domain point fails the batch.
    pub fn locate(&self, points: &[Point]) -> Result<Vec<CellAddress>, GridError> {
        points.iter().map(|p| self.locate_point(p)).collect()
    }
}

/// Locate `points` on `grid`.
pub fn locate(points: &[Point], grid: &GridSpec) -> Result<Vec<CellAddress>, GridError> {
    GridCellLocator::new(grid)?.locate(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LengthUnit;

    fn irregular_grid() -> GridSpec {
        GridSpec::new(
            vec![5.0, 10.0, 20.0],
            vec![1.0, 2.0, 4.0, 8.0],
            (100.0, 50.0),
            10.0,
            vec![4.0, -6.0],
            LengthUnit::Meters,
        )
        .unwrap()
    }

    #[test]
    fn test_centroid_of_every_cell() {
        let grid = irregular_grid();
        let locator = GridCellLocator::new(&grid).unwrap();
        for layer in 0..grid.nlay() {
            let z = grid.layer_midpoint(layer).unwrap();
            for row in 0..grid.nrow() {
                for col in 0..grid.ncol() {
                    let (x, y) = locator.cell_center(row, col).unwrap();
                    let cell = locator.locate_point(&Point::new(x, y, z)).unwrap();
                    assert_eq!((cell.row, cell.col, cell.layer), (row, col, layer));
                    assert!((cell.xloc - 0.5).abs() < 1e-12);
                    assert!((cell.yloc - 0.5).abs() < 1e-12);
                    assert!((cell.zloc - 0.5).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_local_coordinates_in_corner() {
        let grid = irregular_grid();
        // Column 2 spans x in [103, 107]; row 1 spans y in [35, 45]
        let cell = locate(&[Point::new(104.0, 37.5, 9.0)], &grid).unwrap()[0];
        assert_eq!((cell.row, cell.col, cell.layer), (1, 2, 0));
        assert!((cell.xloc - 0.25).abs() < 1e-12);
        assert!((cell.yloc - 0.25).abs() < 1e-12);
        // Layer 0 spans z in [4, 10]
        assert!((cell.zloc - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_shared_face_resolves_to_lower_index() {
        let grid = irregular_grid();
        let locator = GridCellLocator::new(&grid).unwrap();
        // x = 101 is the face between columns 0 and 1; y = 45 between rows 0 and 1
        let cell = locator.locate_point(&Point::new(101.0, 45.0, 4.0)).unwrap();
        assert_eq!((cell.row, cell.col, cell.layer), (0, 0, 0));
        assert!((cell.xloc - 1.0).abs() < 1e-12);
        assert!(cell.yloc.abs() < 1e-12);
        assert!(cell.zloc.abs() < 1e-12);
    }

    #[test]
    fn test_outer_boundary_belongs_to_edge_cells() {
        let grid = irregular_grid();
        let locator = GridCellLocator::new(&grid).unwrap();
        let (xmin, xmax, ymin, ymax) = grid.bounds();
        let ul = locator.locate_point(&Point::new(xmin, ymax, 10.0)).unwrap();
        assert_eq!((ul.row, ul.col, ul.layer), (0, 0, 0));
        let lr = locator.locate_point(&Point::new(xmax, ymin, -6.0)).unwrap();
        assert_eq!((lr.row, lr.col, lr.layer), (2, 3, 1));
    }

    #[test]
    fn test_outside_domain_fails() {
        let grid = irregular_grid();
        let locator = GridCellLocator::new(&grid).unwrap();
        let (xmin, xmax, ymin, ymax) = grid.bounds();
        let outside = [
            Point::new(xmin - 0.01, ymax - 1.0, 0.0),
            Point::new(xmax + 0.01, ymax - 1.0, 0.0),
            Point::new(xmin + 1.0, ymin - 0.01, 0.0),
            Point::new(xmin + 1.0, ymax + 0.01, 0.0),
            Point::new(xmin + 1.0, ymax - 1.0, 10.5),
            Point::new(xmin + 1.0, ymax - 1.0, -6.5),
            Point::new(f64::NAN, ymax - 1.0, 0.0),
        ];
        for p in outside {
            assert!(
                matches!(locator.locate_point(&p), Err(GridError::OutOfDomain { .. })),
                "expected OutOfDomain for {p:?}"
            );
        }
    }

    #[test]
    fn test_batch_fails_on_first_outside_point() {
        let grid = GridSpec::centered(10, 10, 1.0, 1.0, 0.0, -1.0).unwrap();
        let points = [Point::new(0.0, 0.0, -0.5), Point::new(50.0, 0.0, -0.5)];
        assert!(matches!(
            locate(&points, &grid),
            Err(GridError::OutOfDomain { x, .. }) if x == 50.0
        ));
    }

    #[test]
    fn test_centers_and_vertices() {
        let grid = GridSpec::centered(2, 4, 10.0, 5.0, 0.0, -1.0).unwrap();
        let locator = GridCellLocator::new(&grid).unwrap();
        assert_eq!(locator.x_centers(), vec![-7.5, -2.5, 2.5, 7.5]);
        assert_eq!(locator.y_centers(), vec![5.0, -5.0]);
        assert_eq!(locator.cell_centers().len(), 8);
        let v = locator.cell_bounds(0, 0, 0).unwrap().vertices();
        assert_eq!(v[0], (-10.0, 10.0));
        assert_eq!(v[2], (-5.0, 0.0));
        assert!(locator.cell_bounds(2, 0, 0).is_none());
    }
}
