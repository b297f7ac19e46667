//! Writing the optimizer protocol files for a pilot-point store.

use std::path::{Path, PathBuf};

use tracing::info;

use super::CycleError;
use crate::config::CalibrationConfig;
use crate::pilot::PilotPointStore;
use crate::protocol::pilot_values::template_sites;
use crate::protocol::{
    render_pilot_values, render_template, write_text, ControlDocument, FilePair, InstructionSet,
};
use crate::types::{ObservationRecord, ParameterRecord};

/// Files written by `emit_protocol` and the records they were built from.
#[derive(Debug, Clone)]
pub struct EmittedProtocol {
    pub pilot_values: PathBuf,
    pub template: PathBuf,
    pub instruction: PathBuf,
    pub control: PathBuf,
    pub parameters: Vec<ParameterRecord>,
    pub observations: Vec<ObservationRecord>,
    pub instructions: InstructionSet,
}

impl EmittedProtocol {
    /// Directory holding the protocol files.
    pub fn workdir(&self) -> &Path {
        self.control.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Render the pilot-value input file, its template, the instruction file and
/// the control file, then write them into `dir`.
///
/// Every file is rendered before the first one is written, so a rendering
/// error leaves `dir` untouched.
pub fn emit_protocol(
    store: &PilotPointStore,
    config: &CalibrationConfig,
    dir: &Path,
) -> Result<EmittedProtocol, CycleError> {
    let files = &config.files;

    let rows = store.pilot_value_rows();
    let pilot_text = render_pilot_values(&rows)?;
    let template_text = render_template(&pilot_text, &template_sites(&rows))?;

    let parameters = store.parameter_records(&config.parameters);
    let observations = store.observation_records(&config.observations)?;
    let instructions = config.output_layout.instruction_set(&observations)?;
    let instruction_text = instructions.render();

    // The control file names its companions relative to the workspace
    let templates = [FilePair::new(&files.template, &files.pilot_values)];
    let instruction_pairs = [FilePair::new(&files.instruction, &files.model_output)];
    let control_text = ControlDocument {
        settings: &config.control,
        parameters: &parameters,
        observations: &observations,
        command_line: &files.command,
        templates: &templates,
        instructions: &instruction_pairs,
    }
    .render()?;

    std::fs::create_dir_all(dir).map_err(|source| CycleError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let emitted = EmittedProtocol {
        pilot_values: dir.join(&files.pilot_values),
        template: dir.join(&files.template),
        instruction: dir.join(&files.instruction),
        control: dir.join(&files.control),
        parameters,
        observations,
        instructions,
    };
    write_text(&emitted.pilot_values, &pilot_text)?;
    write_text(&emitted.template, &template_text)?;
    write_text(&emitted.instruction, &instruction_text)?;
    write_text(&emitted.control, &control_text)?;

    info!(
        dir = %dir.display(),
        parameters = emitted.parameters.len(),
        observations = emitted.observations.len(),
        "Protocol files written"
    );
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geostat::{VariogramKind, VariogramParameters};
    use crate::pilot::{PilotNaming, SamplingLayout};
    use crate::protocol::{apply_template, parse_pilot_values};
    use crate::types::{GridArray, GridSpec};
    use indexmap::IndexMap;

    fn small_config() -> CalibrationConfig {
        let mut config = CalibrationConfig::default();
        config.grid.nrow = 7;
        config.grid.ncol = 5;
        config.sampling = SamplingLayout {
            nx: 2,
            ny: 2,
            margin_x: 5.0,
            margin_y: 5.0,
        };
        config
    }

    fn store(config: &CalibrationConfig, with_heads: bool) -> PilotPointStore {
        let grid: GridSpec = config.grid_spec().unwrap();
        let locations = config.sampling.points(&grid).unwrap();
        let reference = GridArray::filled(7, 5, 3.0);
        let naming: PilotNaming = config.naming(&grid);
        let mut store = PilotPointStore::sample(&reference, &locations, grid, naming).unwrap();
        if with_heads {
            let heads = GridArray::filled(7, 5, 9.5);
            store.sample_observations(&heads).unwrap();
        }
        store
            .set_variogram(VariogramParameters::new(VariogramKind::Spherical, 1.0, 50.0, 0.0))
            .unwrap();
        store
    }

    #[test]
    fn test_writes_four_files() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let emitted = emit_protocol(&store(&config, true), &config, dir.path()).unwrap();

        for path in [&emitted.pilot_values, &emitted.template, &emitted.instruction, &emitted.control] {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert_eq!(emitted.parameters.len(), 4);
        assert_eq!(emitted.observations.len(), 4);
        assert_eq!(emitted.workdir(), dir.path());

        let control = std::fs::read_to_string(&emitted.control).unwrap();
        assert!(control.contains("model.bat"));
        assert!(control.contains("pilot_points.tpl pilot_points.dat"));
        assert!(control.contains("heads.ins heads.out"));
    }

    #[test]
    fn test_template_reproduces_input_file() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let store = store(&config, true);
        let emitted = emit_protocol(&store, &config, dir.path()).unwrap();

        let template = std::fs::read_to_string(&emitted.template).unwrap();
        let values: IndexMap<String, f64> =
            store.points().iter().map(|p| (p.id.clone(), 7.25)).collect();
        let input = apply_template(&template, &values).unwrap();
        let rows = parse_pilot_values(&input).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.value == 7.25));
    }

    #[test]
    fn test_missing_heads_writes_nothing() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ws");
        let err = emit_protocol(&store(&config, false), &config, &target).unwrap_err();
        assert!(matches!(err, CycleError::Store(_)));
        assert!(!target.exists());
    }
}
