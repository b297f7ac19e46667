//! Synthetic Reference Field
//!
//! Generates a spatially correlated, log-normal hydraulic-conductivity field
//! on the configured grid, for demonstrating and testing a calibration
//! without field data. Optionally writes a matching head field with the
//! reference model's fixed heads on the north and south borders.
//!
//! # Usage
//! ```bash
//! ./truth-field --seed 7 --output truth.json --heads heads.json
//! pilot-points sample --reference truth.json --heads heads.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use tracing::info;

use pilot_points::config::{defaults, CalibrationConfig};
use pilot_points::protocol::write_atomic;
use pilot_points::types::GridArray;

/// Fixed head on the northern border (m).
const NORTH_HEAD: f64 = 12.0;
/// Fixed head on the southern border (m).
const SOUTH_HEAD: f64 = 10.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "truth-field")]
#[command(about = "Synthetic reference conductivity field for pilot-point calibration")]
#[command(version)]
struct Args {
    /// Calibration config providing the grid (default: $PILOT_POINTS_CONFIG, then ./calibration.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file for the conductivity field
    #[arg(short, long, default_value = "truth.json")]
    output: PathBuf,

    /// Also write a head field to this file
    #[arg(long)]
    heads: Option<PathBuf>,

    /// Geometric mean conductivity
    #[arg(long, default_value_t = defaults::TRUTH_MEAN_HK)]
    mean: f64,

    /// Standard deviation of ln(conductivity)
    #[arg(long, default_value_t = defaults::TRUTH_LN_SIGMA)]
    sigma: f64,

    /// Smoothing radius in cells; larger values give longer correlation
    #[arg(long, default_value = "4")]
    radius: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Field Generation
// ============================================================================

/// Box-filter `noise` with the given radius, clipping the window at the edges.
fn smooth(noise: &GridArray, radius: usize) -> GridArray {
    let mut out = GridArray::filled(noise.nrow, noise.ncol, 0.0);
    for r in 0..noise.nrow {
        for c in 0..noise.ncol {
            let rows = r.saturating_sub(radius)..=(r + radius).min(noise.nrow - 1);
            let cols = c.saturating_sub(radius)..=(c + radius).min(noise.ncol - 1);
            let mut sum = 0.0;
            let mut n = 0usize;
            for rr in rows {
                for cc in cols.clone() {
                    sum += noise.values[rr * noise.ncol + cc];
                    n += 1;
                }
            }
            out.values[r * noise.ncol + c] = sum / n as f64;
        }
    }
    out
}

/// Rescale to zero mean and unit standard deviation.
fn standardize(field: &mut GridArray) {
    let n = field.values.len() as f64;
    let mean = field.values.iter().sum::<f64>() / n;
    let var = field.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt().max(f64::EPSILON);
    for v in &mut field.values {
        *v = (*v - mean) / std;
    }
}

fn conductivity_field(nrow: usize, ncol: usize, args: &Args, rng: &mut StdRng) -> Result<GridArray> {
    let normal = Normal::new(0.0, 1.0).context("Invalid noise distribution")?;
    let noise = GridArray {
        nrow,
        ncol,
        values: (0..nrow * ncol).map(|_| normal.sample(rng)).collect(),
    };
    let mut field = smooth(&noise, args.radius);
    standardize(&mut field);
    let ln_mean = args.mean.ln();
    for v in &mut field.values {
        *v = (ln_mean + args.sigma * *v).exp();
    }
    Ok(field)
}

/// Heads falling linearly from the northern to the southern border, row by row.
fn head_field(nrow: usize, ncol: usize) -> GridArray {
    let mut heads = GridArray::filled(nrow, ncol, NORTH_HEAD);
    let span = (nrow.saturating_sub(1)).max(1) as f64;
    for r in 0..nrow {
        let h = NORTH_HEAD + (SOUTH_HEAD - NORTH_HEAD) * r as f64 / span;
        for c in 0..ncol {
            heads.set(r, c, h);
        }
    }
    heads
}

fn write_field(path: &Path, field: &GridArray) -> Result<()> {
    let json = serde_json::to_vec_pretty(field)?;
    write_atomic(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), nrow = field.nrow, ncol = field.ncol, "Field written");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    if !(args.mean > 0.0 && args.mean.is_finite()) || !(args.sigma >= 0.0 && args.sigma.is_finite()) {
        anyhow::bail!("--mean must be positive and --sigma non-negative");
    }

    let config = match &args.config {
        Some(p) => CalibrationConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display()))?,
        None => CalibrationConfig::load(),
    };
    let grid = config.grid_spec().context("Invalid [grid] configuration")?;
    let (nrow, ncol) = (grid.nrow(), grid.ncol());

    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let field = conductivity_field(nrow, ncol, &args, &mut rng)?;
    write_field(&args.output, &field)?;

    if let Some(path) = &args.heads {
        write_field(path, &head_field(nrow, ncol))?;
    }
    Ok(())
}
