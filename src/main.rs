//! Pilot Points - calibration workspace driver
//!
//! Runs each stage of a pilot-point calibration against a workspace
//! directory. Stages hand over through the pilot-point snapshot, so each
//! subcommand can run in a separate process.
//!
//! # Usage
//!
//! ```bash
//! # Sample pilot points from a reference field and fit the variogram
//! pilot-points sample --reference truth.json --heads heads.json
//!
//! # Write the optimizer files, run the optimizer, read its estimates back
//! pilot-points emit
//! pest calibration.pst
//! pilot-points ingest
//!
//! # Krige the estimates onto the model grid
//! pilot-points interpolate
//! ```
//!
//! # Environment Variables
//!
//! - `PILOT_POINTS_CONFIG`: Path to the calibration TOML file
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use tracing::info;

use pilot_points::calibration::{CalibrationCycle, CommandOptimizer};
use pilot_points::config::CalibrationConfig;
use pilot_points::grid::GridCellLocator;
use pilot_points::pilot::PilotPointStore;
use pilot_points::protocol::{parse_pilot_values, write_atomic, ResultReader};
use pilot_points::types::{GridArray, Point};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pilot-points")]
#[command(about = "Pilot-point kriging and optimizer file generation")]
#[command(version)]
struct CliArgs {
    /// Calibration config file (default: $PILOT_POINTS_CONFIG, then ./calibration.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory holding the snapshot and protocol files
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Sample pilot points from a reference field and attach a variogram
    Sample {
        /// Reference parameter field (JSON grid array)
        #[arg(long)]
        reference: PathBuf,
        /// Observed heads at the same cells (JSON grid array)
        #[arg(long)]
        heads: Option<PathBuf>,
    },

    /// Write the pilot-value, template, instruction and control files
    Emit,

    /// Read the optimizer's result file into the snapshot
    Ingest {
        /// Result file (default: the control file with a .par extension)
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Krige the snapshot values onto the model grid
    Interpolate {
        /// Take values from the pilot-value input file instead of the snapshot
        #[arg(long)]
        from_input: bool,
    },

    /// Emit, run the optimizer to completion, ingest and interpolate
    Calibrate {
        /// Optimizer executable; the control file name is passed as its last argument
        #[arg(long, default_value = "pest")]
        optimizer: String,
    },

    /// Print the cell holding a world point
    Locate {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        /// Elevation (default: middle of the top layer)
        #[arg(long, allow_hyphen_values = true)]
        z: Option<f64>,
    },

    /// Write the effective configuration as TOML
    InitConfig {
        #[arg(long, default_value = "calibration.toml")]
        output: PathBuf,
    },
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<CalibrationConfig> {
    match path {
        Some(p) => CalibrationConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(CalibrationConfig::load()),
    }
}

fn read_field(path: &Path) -> Result<GridArray> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("Invalid grid array in {}", path.display()))
}

fn load_store(config: &CalibrationConfig, workspace: &Path) -> Result<PilotPointStore> {
    let path = workspace.join(&config.files.snapshot);
    PilotPointStore::load(&path).with_context(|| format!("Failed to load snapshot {}", path.display()))
}

fn save_store(store: &PilotPointStore, config: &CalibrationConfig, workspace: &Path) -> Result<()> {
    let path = workspace.join(&config.files.snapshot);
    store
        .persist(&path)
        .with_context(|| format!("Failed to save snapshot {}", path.display()))
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_sample(
    config: &CalibrationConfig,
    workspace: &Path,
    reference: &Path,
    heads: Option<&Path>,
) -> Result<()> {
    let grid = config.grid_spec().context("Invalid [grid] configuration")?;
    let locations = config.sampling.points(&grid).context("Invalid [sampling] layout")?;
    let naming = config.naming(&grid);
    let reference = read_field(reference)?;
    let mut store = PilotPointStore::sample(&reference, &locations, grid, naming)
        .context("Failed to sample pilot points")?;
    if let Some(path) = heads {
        store
            .sample_observations(&read_field(path)?)
            .context("Failed to sample observed heads")?;
    }

    let mut cycle = CalibrationCycle::new(store);
    match config.variogram.fixed_parameters() {
        Some(params) => cycle.assign_variogram(params)?,
        None => {
            cycle.fit_variogram(config.variogram.kind, config.variogram.nlags)?;
        }
    }
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("Failed to create {}", workspace.display()))?;
    save_store(&cycle.into_store(), config, workspace)
}

fn run_emit(config: &CalibrationConfig, workspace: &Path) -> Result<()> {
    let mut cycle = CalibrationCycle::resume(load_store(config, workspace)?);
    let emitted = cycle.emit_protocol(config, workspace)?;
    info!(control = %emitted.control.display(), "Run the optimizer on this control file");
    Ok(())
}

fn run_ingest(config: &CalibrationConfig, workspace: &Path, results: Option<&Path>) -> Result<()> {
    let mut store = load_store(config, workspace)?;
    let path = results.map_or_else(|| workspace.join(config.files.results()), Path::to_path_buf);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read result file {}", path.display()))?;
    let reader = ResultReader::new(&store.parameter_records(&config.parameters));
    let estimates = reader
        .read(&text)
        .with_context(|| format!("Invalid result file {}", path.display()))?;
    store.update_values(&estimates)?;
    save_store(&store, config, workspace)
}

fn run_interpolate(config: &CalibrationConfig, workspace: &Path, from_input: bool) -> Result<()> {
    let mut store = load_store(config, workspace)?;
    if from_input {
        let path = workspace.join(&config.files.pilot_values);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let values: IndexMap<String, f64> = parse_pilot_values(&text)
            .with_context(|| format!("Invalid pilot-value file {}", path.display()))?
            .into_iter()
            .map(|row| (row.id, row.value))
            .collect();
        store.update_values(&values)?;
    }

    let grid = store.grid().clone();
    let field = store.interpolate(&grid)?;
    let path = workspace.join(&config.files.field);
    let json = serde_json::to_vec_pretty(&field)?;
    write_atomic(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Interpolated field written");
    Ok(())
}

fn run_calibrate(config: &CalibrationConfig, workspace: &Path, optimizer: &str) -> Result<()> {
    let mut cycle = CalibrationCycle::resume(load_store(config, workspace)?);
    let optimizer = CommandOptimizer::new(optimizer);
    let field = cycle.calibrate(config, workspace, &optimizer)?;

    let path = workspace.join(&config.files.field);
    let json = serde_json::to_vec_pretty(field)?;
    write_atomic(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    save_store(cycle.store(), config, workspace)
}

fn run_locate(config: &CalibrationConfig, x: f64, y: f64, z: Option<f64>) -> Result<()> {
    let grid = config.grid_spec().context("Invalid [grid] configuration")?;
    let z = z.or_else(|| grid.layer_midpoint(0)).unwrap_or(grid.top);
    let cell = GridCellLocator::new(&grid)?.locate_point(&Point::new(x, y, z))?;
    println!(
        "row {} col {} layer {} (local {:.4}, {:.4}, {:.4})",
        cell.row, cell.col, cell.layer, cell.xloc, cell.yloc, cell.zloc
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;
    let workspace = args.workspace.as_path();

    match &args.command {
        SubCommand::Sample { reference, heads } => {
            run_sample(&config, workspace, reference, heads.as_deref())
        }
        SubCommand::Emit => run_emit(&config, workspace),
        SubCommand::Ingest { results } => run_ingest(&config, workspace, results.as_deref()),
        SubCommand::Interpolate { from_input } => run_interpolate(&config, workspace, *from_input),
        SubCommand::Calibrate { optimizer } => run_calibrate(&config, workspace, optimizer),
        SubCommand::Locate { x, y, z } => run_locate(&config, *x, *y, *z),
        SubCommand::InitConfig { output } => {
            config
                .save_to_file(output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            Ok(())
        }
    }
}
