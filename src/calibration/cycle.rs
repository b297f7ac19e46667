//! The calibration cycle state machine.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};

use super::emit::{emit_protocol, EmittedProtocol};
use super::ports::{OptimizerPort, SimulatorPort};
use super::{CalibrationStage, CycleError};
use crate::config::CalibrationConfig;
use crate::geostat::{VariogramKind, VariogramParameters};
use crate::pilot::PilotPointStore;
use crate::protocol::{apply_template, write_text, ResultReader};
use crate::types::InterpolatedField;

/// One pass from sampled pilot points to an interpolated field.
///
/// Each stage method checks the current stage first; calling one out of
/// order returns `InvalidTransition` and leaves the cycle untouched. A stage
/// that fails moves the cycle to `Aborted`, after which every call returns
/// `CycleError::Aborted`.
#[derive(Debug)]
pub struct CalibrationCycle {
    stage: CalibrationStage,
    store: PilotPointStore,
    emitted: Option<EmittedProtocol>,
    estimates: Option<IndexMap<String, f64>>,
    field: Option<InterpolatedField>,
}

impl CalibrationCycle {
    /// Start from freshly sampled pilot points.
    pub fn new(store: PilotPointStore) -> Self {
        Self {
            stage: CalibrationStage::Sampled,
            store,
            emitted: None,
            estimates: None,
            field: None,
        }
    }

    /// Continue from a loaded snapshot; a store with a variogram has already
    /// passed the fitting stage.
    pub fn resume(store: PilotPointStore) -> Self {
        let stage = if store.variogram().is_some() {
            CalibrationStage::VariogramFitted
        } else {
            CalibrationStage::Sampled
        };
        Self {
            stage,
            ..Self::new(store)
        }
    }

    pub const fn stage(&self) -> CalibrationStage {
        self.stage
    }

    pub const fn store(&self) -> &PilotPointStore {
        &self.store
    }

    pub fn into_store(self) -> PilotPointStore {
        self.store
    }

    pub const fn emitted(&self) -> Option<&EmittedProtocol> {
        self.emitted.as_ref()
    }

    /// Optimizer estimates, keyed as in the control file.
    pub const fn estimates(&self) -> Option<&IndexMap<String, f64>> {
        self.estimates.as_ref()
    }

    pub const fn field(&self) -> Option<&InterpolatedField> {
        self.field.as_ref()
    }

    fn check(&self, from: CalibrationStage, to: CalibrationStage) -> Result<(), CycleError> {
        if self.stage == CalibrationStage::Aborted {
            return Err(CycleError::Aborted);
        }
        if self.stage != from {
            return Err(CycleError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        Ok(())
    }

    /// Run `step` with the cycle in `from`; move to `to` on success and to
    /// `Aborted` on failure.
    fn advance<T>(
        &mut self,
        from: CalibrationStage,
        to: CalibrationStage,
        step: impl FnOnce(&mut Self) -> Result<T, CycleError>,
    ) -> Result<T, CycleError> {
        self.check(from, to)?;
        match step(self) {
            Ok(value) => {
                info!(from = %from, to = %to, "Calibration stage complete");
                self.stage = to;
                Ok(value)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn abort(&mut self, error: CycleError) -> CycleError {
        warn!(stage = %self.stage, error = %error, "Calibration cycle aborted");
        self.stage = CalibrationStage::Aborted;
        error
    }

    /// Fit a variogram of `kind` to the sampled values.
    pub fn fit_variogram(
        &mut self,
        kind: VariogramKind,
        nlags: usize,
    ) -> Result<VariogramParameters, CycleError> {
        self.advance(
            CalibrationStage::Sampled,
            CalibrationStage::VariogramFitted,
            |cycle| Ok(cycle.store.fit_variogram(kind, nlags)?),
        )
    }

    /// Use a known variogram instead of fitting one.
    pub fn assign_variogram(&mut self, params: VariogramParameters) -> Result<(), CycleError> {
        self.advance(
            CalibrationStage::Sampled,
            CalibrationStage::VariogramFitted,
            |cycle| Ok(cycle.store.set_variogram(params)?),
        )
    }

    /// Write the protocol files into `dir`.
    pub fn emit_protocol(
        &mut self,
        config: &CalibrationConfig,
        dir: &Path,
    ) -> Result<&EmittedProtocol, CycleError> {
        let emitted = self.advance(
            CalibrationStage::VariogramFitted,
            CalibrationStage::ProtocolEmitted,
            |cycle| emit_protocol(&cycle.store, config, dir),
        )?;
        Ok(self.emitted.insert(emitted))
    }

    /// Hand the emitted control file to the optimizer and wait for its result
    /// file. The stage does not change; ingest the returned file next.
    pub fn run_optimizer(&mut self, optimizer: &dyn OptimizerPort) -> Result<PathBuf, CycleError> {
        self.check(CalibrationStage::ProtocolEmitted, CalibrationStage::ResultsParsed)?;
        let control = match &self.emitted {
            Some(emitted) => emitted.control.clone(),
            None => {
                return Err(CycleError::InvalidTransition {
                    from: self.stage,
                    to: CalibrationStage::ResultsParsed,
                })
            }
        };
        optimizer.run(&control).map_err(|e| self.abort(e.into()))
    }

    /// Run the simulator once against the current model input and read the
    /// observations back through the emitted instructions.
    pub fn simulate_observations(
        &mut self,
        simulator: &dyn SimulatorPort,
    ) -> Result<IndexMap<String, f64>, CycleError> {
        if self.stage == CalibrationStage::Aborted {
            return Err(CycleError::Aborted);
        }
        let Some(emitted) = &self.emitted else {
            return Err(CycleError::InvalidTransition {
                from: self.stage,
                to: CalibrationStage::ProtocolEmitted,
            });
        };
        let observed = simulator
            .run(emitted.workdir())
            .map_err(CycleError::from)
            .and_then(|output| Ok(emitted.instructions.read_observations(&output)?));
        observed.map_err(|e| self.abort(e))
    }

    /// Read the optimizer's result file, update the pilot values and
    /// substitute the estimates into the model input file.
    pub fn ingest_results(&mut self, results: &Path) -> Result<usize, CycleError> {
        self.advance(
            CalibrationStage::ProtocolEmitted,
            CalibrationStage::ResultsParsed,
            |cycle| {
                let Some(emitted) = &cycle.emitted else {
                    return Err(CycleError::InvalidTransition {
                        from: CalibrationStage::ProtocolEmitted,
                        to: CalibrationStage::ResultsParsed,
                    });
                };
                let read = |path: &Path| {
                    std::fs::read_to_string(path).map_err(|source| CycleError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                };
                let estimates = ResultReader::new(&emitted.parameters).read(&read(results)?)?;
                let template = read(&emitted.template)?;
                let model_input = apply_template(&template, &estimates)?;

                // Store changes commit only once the model input is on disk
                let mut store = cycle.store.clone();
                let updated = store.update_values(&estimates)?;
                write_text(&emitted.pilot_values, &model_input)?;
                cycle.store = store;
                info!(
                    results = %results.display(),
                    updated,
                    "Optimizer estimates ingested"
                );
                cycle.estimates = Some(estimates);
                Ok(updated)
            },
        )
    }

    /// Krige the estimated pilot values onto the store's grid.
    pub fn interpolate(&mut self) -> Result<&InterpolatedField, CycleError> {
        let field = self.advance(
            CalibrationStage::ResultsParsed,
            CalibrationStage::Interpolated,
            |cycle| {
                let grid = cycle.store.grid().clone();
                Ok(cycle.store.interpolate(&grid)?)
            },
        )?;
        Ok(self.field.insert(field))
    }

    /// Every remaining stage with `optimizer` as the external loop.
    ///
    /// A cycle still in `Sampled` gets the configured variogram, fitted or
    /// fixed.
    pub fn calibrate(
        &mut self,
        config: &CalibrationConfig,
        dir: &Path,
        optimizer: &dyn OptimizerPort,
    ) -> Result<&InterpolatedField, CycleError> {
        if self.stage == CalibrationStage::Sampled {
            match config.variogram.fixed_parameters() {
                Some(params) => self.assign_variogram(params)?,
                None => {
                    self.fit_variogram(config.variogram.kind, config.variogram.nlags)?;
                }
            }
        }
        self.emit_protocol(config, dir)?;
        let results = self.run_optimizer(optimizer)?;
        self.ingest_results(&results)?;
        self.interpolate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PortError;
    use crate::pilot::SamplingLayout;
    use crate::protocol::render_results;
    use crate::types::{GridArray, GridSpec};

    /// Writes a fixed value for every parameter, the way the optimizer's
    /// final result file looks.
    struct ConstantOptimizer(f64);

    impl OptimizerPort for ConstantOptimizer {
        fn run(&self, control_file: &Path) -> Result<PathBuf, PortError> {
            let text = std::fs::read_to_string(control_file).map_err(|source| PortError::Io {
                path: control_file.to_path_buf(),
                source,
            })?;
            let names: Vec<String> = text
                .lines()
                .skip_while(|l| *l != "* parameter data")
                .skip(1)
                .take_while(|l| !l.starts_with('*'))
                .filter_map(|l| l.split_whitespace().next().map(str::to_string))
                .collect();
            let records: Vec<_> = names
                .iter()
                .map(|n| crate::types::ParameterDefaults::default().record(n.clone()))
                .collect();
            let values = vec![self.0; records.len()];
            let out = control_file.with_extension("par");
            let rendered = render_results(&records, &values).map_err(|e| PortError::Io {
                path: out.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            })?;
            std::fs::write(&out, rendered).map_err(|source| PortError::Io {
                path: out.clone(),
                source,
            })?;
            Ok(out)
        }
    }

    struct FailingOptimizer;

    impl OptimizerPort for FailingOptimizer {
        fn run(&self, control_file: &Path) -> Result<PathBuf, PortError> {
            Err(PortError::MissingOutput {
                program: "pest".to_string(),
                path: control_file.with_extension("par"),
            })
        }
    }

    fn config() -> CalibrationConfig {
        let mut config = CalibrationConfig::default();
        config.grid.nrow = 7;
        config.grid.ncol = 5;
        config.sampling = SamplingLayout {
            nx: 2,
            ny: 2,
            margin_x: 5.0,
            margin_y: 5.0,
        };
        config.variogram.fit = false;
        config.variogram.sill = Some(1.0);
        config.variogram.range = Some(60.0);
        config
    }

    fn sampled(config: &CalibrationConfig) -> PilotPointStore {
        let grid: GridSpec = config.grid_spec().unwrap();
        let locations = config.sampling.points(&grid).unwrap();
        let naming = config.naming(&grid);
        let mut store =
            PilotPointStore::sample(&GridArray::filled(7, 5, 2.0), &locations, grid, naming).unwrap();
        store.sample_observations(&GridArray::filled(7, 5, 10.0)).unwrap();
        store
    }

    #[test]
    fn test_full_cycle_reaches_interpolated() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = CalibrationCycle::new(sampled(&config));
        let field = cycle
            .calibrate(&config, dir.path(), &ConstantOptimizer(4.0))
            .unwrap();
        // Every pilot value is 4.0, so the kriged field is flat
        assert!(field.values.values.iter().all(|v| (v - 4.0).abs() < 1e-9));
        assert_eq!(cycle.stage(), CalibrationStage::Interpolated);
        assert!(cycle.store().points().iter().all(|p| p.value == 4.0));
        assert_eq!(cycle.estimates().map(IndexMap::len), Some(4));

        let input = std::fs::read_to_string(dir.path().join("pilot_points.dat")).unwrap();
        let rows = crate::protocol::parse_pilot_values(&input).unwrap();
        assert!(rows.iter().all(|r| r.value == 4.0));
    }

    #[test]
    fn test_out_of_order_stage_is_rejected_without_abort() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = CalibrationCycle::new(sampled(&config));
        let err = cycle.emit_protocol(&config, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CycleError::InvalidTransition {
                from: CalibrationStage::Sampled,
                to: CalibrationStage::ProtocolEmitted
            }
        ));
        assert_eq!(cycle.stage(), CalibrationStage::Sampled);
    }

    #[test]
    fn test_optimizer_failure_aborts_cycle() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = CalibrationCycle::new(sampled(&config));
        let err = cycle
            .calibrate(&config, dir.path(), &FailingOptimizer)
            .unwrap_err();
        assert!(matches!(err, CycleError::Port(PortError::MissingOutput { .. })));
        assert_eq!(cycle.stage(), CalibrationStage::Aborted);
        assert!(matches!(
            cycle.ingest_results(&dir.path().join("calibration.par")),
            Err(CycleError::Aborted)
        ));
    }

    #[test]
    fn test_failed_model_input_write_leaves_store_unchanged() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = CalibrationCycle::new(sampled(&config));
        cycle.assign_variogram(config.variogram.fixed_parameters().unwrap()).unwrap();
        cycle.emit_protocol(&config, dir.path()).unwrap();
        let results = cycle.run_optimizer(&ConstantOptimizer(4.0)).unwrap();

        // A non-empty directory where the model input belongs cannot be replaced
        let input = dir.path().join("pilot_points.dat");
        std::fs::remove_file(&input).ok();
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("keep"), "x").unwrap();

        let err = cycle.ingest_results(&results).unwrap_err();
        assert!(
            matches!(err, CycleError::Protocol(crate::protocol::ProtocolError::Io { .. })),
            "{err:?}"
        );
        assert_eq!(cycle.stage(), CalibrationStage::Aborted);
        assert!(cycle.store().points().iter().all(|p| p.value == 2.0));
        assert!(cycle.estimates().is_none());
    }

    #[test]
    fn test_count_mismatch_aborts_cycle() {
        let config = config();
        let dir = tempfile::tempdir().unwrap();
        let mut cycle = CalibrationCycle::new(sampled(&config));
        cycle.assign_variogram(config.variogram.fixed_parameters().unwrap()).unwrap();
        cycle.emit_protocol(&config, dir.path()).unwrap();

        let short = dir.path().join("short.par");
        std::fs::write(&short, "single point\nhk0000 1.0 1.0 0.0\n").unwrap();
        let err = cycle.ingest_results(&short).unwrap_err();
        assert!(matches!(
            err,
            CycleError::Protocol(crate::protocol::ProtocolError::ParameterCountMismatch { .. })
        ));
        assert_eq!(cycle.stage(), CalibrationStage::Aborted);
        // Nothing was applied
        assert!(cycle.store().points().iter().all(|p| p.value == 2.0));
    }

    #[test]
    fn test_resume_skips_fitting() {
        let config = config();
        let mut store = sampled(&config);
        store
            .set_variogram(config.variogram.fixed_parameters().unwrap())
            .unwrap();
        let cycle = CalibrationCycle::resume(store);
        assert_eq!(cycle.stage(), CalibrationStage::VariogramFitted);
    }
}
