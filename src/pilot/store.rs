//! Pilot-point store and its JSON snapshot.
//!
//! The snapshot is the hand-off between the sampling stage and every later
//! stage. Its required fields are the grid, each point's
//! `(id, row, col, x, y, value)` and the variogram; everything else is optional
//! so snapshots written by older versions keep loading.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PilotNaming, StoreError};
use crate::geostat::{
    fit_variogram, EmpiricalVariogram, OrdinaryKriging, VariogramKind, VariogramModel,
    VariogramParameters,
};
use crate::grid::GridCellLocator;
use crate::protocol::{write_atomic, PilotValueRow};
use crate::types::{
    CellAddress, GridArray, GridSpec, InterpolatedField, ObservationDefaults, ObservationRecord,
    ParameterDefaults, ParameterRecord, Point,
};

/// Current snapshot schema. Snapshots without a version are version 1.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotPoint {
    pub id: String,
    #[serde(flatten)]
    pub cell: CellAddress,
    pub x: f64,
    pub y: f64,
    /// Sampled or most recently estimated parameter value.
    pub value: f64,
    /// Measured state (e.g. head) at this location, when one was sampled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
}

impl PilotPoint {
    pub const fn location(&self) -> Point {
        Point::planar(self.x, self.y)
    }
}

const fn legacy_schema() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "legacy_schema")]
    schema_version: u32,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    grid: GridSpec,
    points: Vec<PilotPoint>,
    variogram: VariogramParameters,
    #[serde(default)]
    naming: PilotNaming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PilotPointStore {
    grid: GridSpec,
    points: Vec<PilotPoint>,
    variogram: Option<VariogramParameters>,
    naming: PilotNaming,
}

fn check_shape(field: &'static str, array: &GridArray, grid: &GridSpec) -> Result<(), StoreError> {
    if array.nrow != grid.nrow() || array.ncol != grid.ncol() || !array.is_consistent() {
        return Err(StoreError::ShapeMismatch {
            field,
            found_rows: array.nrow,
            found_cols: array.ncol,
            nrow: grid.nrow(),
            ncol: grid.ncol(),
        });
    }
    Ok(())
}

impl PilotPointStore {
    /// Locate each of `locations` on `grid` and read `reference` at its cell.
    ///
    /// Fails on the first location outside the grid, and when two locations
    /// fall in the same cell.
    pub fn sample(
        reference: &GridArray,
        locations: &[Point],
        grid: GridSpec,
        naming: PilotNaming,
    ) -> Result<Self, StoreError> {
        check_shape("reference", reference, &grid)?;
        let locator = GridCellLocator::new(&grid)?;
        let cells = locator.locate(locations)?;

        let mut points: Vec<PilotPoint> = Vec::with_capacity(locations.len());
        for (p, cell) in locations.iter().zip(cells) {
            let id = naming.parameter_name(cell.row, cell.col);
            if points.iter().any(|q| q.id == id) {
                return Err(StoreError::DuplicateCell(id));
            }
            let value = reference
                .get(cell.row, cell.col)
                .ok_or_else(|| StoreError::InvalidSnapshot(format!("no reference value at {id}")))?;
            points.push(PilotPoint {
                id,
                cell,
                x: p.x,
                y: p.y,
                value,
                observed: None,
            });
        }

        info!(
            points = points.len(),
            nrow = grid.nrow(),
            ncol = grid.ncol(),
            "Sampled pilot points from reference field"
        );
        Ok(Self {
            grid,
            points,
            variogram: None,
            naming,
        })
    }

    /// Record the observed state (e.g. heads) at every pilot point's cell.
    pub fn sample_observations(&mut self, observed: &GridArray) -> Result<(), StoreError> {
        check_shape("observation", observed, &self.grid)?;
        for p in &mut self.points {
            p.observed = observed.get(p.cell.row, p.cell.col);
        }
        debug!(points = self.points.len(), "Sampled observed values");
        Ok(())
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn points(&self) -> &[PilotPoint] {
        &self.points
    }

    pub fn naming(&self) -> &PilotNaming {
        &self.naming
    }

    pub const fn variogram(&self) -> Option<&VariogramParameters> {
        self.variogram.as_ref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn set_variogram(&mut self, params: VariogramParameters) -> Result<(), StoreError> {
        VariogramModel::new(params)?;
        self.variogram = Some(params);
        Ok(())
    }

    /// Fit a variogram of `kind` to the current values and attach it.
    pub fn fit_variogram(
        &mut self,
        kind: VariogramKind,
        nlags: usize,
    ) -> Result<VariogramParameters, StoreError> {
        let empirical = EmpiricalVariogram::compute(&self.samples(), nlags);
        let params = fit_variogram(&empirical, kind)?;
        self.set_variogram(params)?;
        info!(
            kind = %params.kind,
            sill = params.sill,
            range = params.range,
            nugget = params.nugget,
            "Variogram fitted to pilot values"
        );
        Ok(params)
    }

    /// Overwrite values by id (matched ignoring case).
    ///
    /// Every id is checked before anything is written, so a failed update
    /// leaves the store unchanged. Returns the number of points updated.
    pub fn update_values(&mut self, new_values: &IndexMap<String, f64>) -> Result<usize, StoreError> {
        let index: HashMap<String, usize> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.to_lowercase(), i))
            .collect();

        let mut updates = Vec::with_capacity(new_values.len());
        for (id, &value) in new_values {
            let i = *index
                .get(&id.to_lowercase())
                .ok_or_else(|| StoreError::UnknownId(id.clone()))?;
            if !value.is_finite() {
                return Err(StoreError::InvalidValue {
                    id: id.clone(),
                    value,
                });
            }
            updates.push((i, value));
        }
        for &(i, value) in &updates {
            self.points[i].value = value;
        }
        info!(updated = updates.len(), "Pilot point values updated");
        Ok(updates.len())
    }

    /// `(location, value)` pairs for kriging.
    pub fn samples(&self) -> Vec<(Point, f64)> {
        self.points.iter().map(|p| (p.location(), p.value)).collect()
    }

    pub fn kriging(&self) -> Result<OrdinaryKriging, StoreError> {
        let params = self.variogram.ok_or(StoreError::MissingVariogram)?;
        Ok(OrdinaryKriging::new(&self.samples(), params)?)
    }

    /// Krige the current values onto every cell of `target`.
    pub fn interpolate(&self, target: &GridSpec) -> Result<InterpolatedField, StoreError> {
        let field = self.kriging()?.predict_grid(target)?;
        info!(
            nrow = target.nrow(),
            ncol = target.ncol(),
            clamped = field.clamped_cells.len(),
            "Interpolated pilot values onto grid"
        );
        Ok(field)
    }

    /// One parameter per pilot point, in store order.
    pub fn parameter_records(&self, defaults: &ParameterDefaults) -> Vec<ParameterRecord> {
        self.points.iter().map(|p| defaults.record(p.id.clone())).collect()
    }

    /// One observation per pilot point, in store order. Every point must carry
    /// an observed value.
    pub fn observation_records(
        &self,
        defaults: &ObservationDefaults,
    ) -> Result<Vec<ObservationRecord>, StoreError> {
        self.points
            .iter()
            .map(|p| {
                let value = p
                    .observed
                    .ok_or_else(|| StoreError::MissingObservation(p.id.clone()))?;
                Ok(defaults.record(self.observation_name(p), value))
            })
            .collect()
    }

    pub fn observation_name(&self, point: &PilotPoint) -> String {
        self.naming.observation_name(point.cell.row, point.cell.col)
    }

    /// Rows of the pilot-value input file.
    pub fn pilot_value_rows(&self) -> Vec<PilotValueRow> {
        self.points
            .iter()
            .map(|p| PilotValueRow {
                id: p.id.clone(),
                row: p.cell.row,
                col: p.cell.col,
                x: p.x,
                y: p.y,
                value: p.value,
            })
            .collect()
    }

    /// Write the snapshot. A variogram must be attached.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let variogram = self.variogram.ok_or(StoreError::MissingVariogram)?;
        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            created_at: Some(Utc::now()),
            grid: self.grid.clone(),
            points: self.points.clone(),
            variogram,
            naming: self.naming.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(path, &json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), points = self.points.len(), "Pilot point snapshot saved");
        Ok(())
    }

    /// Read a snapshot written by `persist`.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json(&data)?;
        info!(path = %path.display(), points = store.points.len(), "Pilot point snapshot loaded");
        Ok(store)
    }

    fn from_json(data: &[u8]) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_slice(data)?;
        if snapshot.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: snapshot.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        snapshot.grid.validate()?;
        VariogramModel::new(snapshot.variogram)?;
        for p in &snapshot.points {
            if p.cell.row >= snapshot.grid.nrow() || p.cell.col >= snapshot.grid.ncol() {
                return Err(StoreError::InvalidSnapshot(format!(
                    "point '{}' at ({}, {}) lies outside the {}x{} grid",
                    p.id,
                    p.cell.row,
                    p.cell.col,
                    snapshot.grid.nrow(),
                    snapshot.grid.ncol()
                )));
            }
        }
        Ok(Self {
            grid: snapshot.grid,
            points: snapshot.points,
            variogram: Some(snapshot.variogram),
            naming: snapshot.naming,
        })
    }
}
