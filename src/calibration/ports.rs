//! External processes the calibration depends on.
//!
//! The simulator turns a model input file into an observation table; the
//! optimizer repeatedly runs the simulator and writes its estimates. Both
//! are opaque: they are started, awaited and their files read back.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("'{program}' finished without writing {path}")]
    MissingOutput { program: String, path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the forward model once.
pub trait SimulatorPort {
    /// Run the model in `workdir` and return the text of its observation output.
    fn run(&self, workdir: &Path) -> Result<String, PortError>;
}

/// Runs the optimizer to completion.
pub trait OptimizerPort {
    /// Run against `control_file` and return the path of the result file.
    fn run(&self, control_file: &Path) -> Result<PathBuf, PortError>;
}

fn run_to_completion(mut cmd: Command, program: &str) -> Result<(), PortError> {
    let output = cmd.output().map_err(|source| PortError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(PortError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!(
        program,
        stdout_bytes = output.stdout.len(),
        "External process finished"
    );
    Ok(())
}

/// Simulator started as a command; its observation table is read from
/// `output_file` in the working directory.
#[derive(Debug, Clone)]
pub struct CommandSimulator {
    program: String,
    args: Vec<String>,
    output_file: PathBuf,
}

impl CommandSimulator {
    pub fn new(program: impl Into<String>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_file: output_file.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl SimulatorPort for CommandSimulator {
    fn run(&self, workdir: &Path) -> Result<String, PortError> {
        info!(program = %self.program, workdir = %workdir.display(), "Running simulator");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(workdir);
        run_to_completion(cmd, &self.program)?;

        let path = workdir.join(&self.output_file);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PortError::MissingOutput {
                program: self.program.clone(),
                path,
            }),
            Err(source) => Err(PortError::Io { path, source }),
        }
    }
}

/// Optimizer started as `program [args...] <control file name>` in the
/// control file's directory. The result file shares the control file's
/// stem with a `.par` extension.
#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    program: String,
    args: Vec<String>,
}

impl CommandOptimizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl OptimizerPort for CommandOptimizer {
    fn run(&self, control_file: &Path) -> Result<PathBuf, PortError> {
        let workdir = match control_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let name = control_file.file_name().ok_or_else(|| PortError::Io {
            path: control_file.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
        })?;
        info!(program = %self.program, control = %control_file.display(), "Running optimizer");

        let result = control_file.with_extension("par");
        // A result left over from an earlier run must not pass for this one
        if result.exists() {
            std::fs::remove_file(&result).map_err(|source| PortError::Io {
                path: result.clone(),
                source,
            })?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(name).current_dir(workdir);
        run_to_completion(cmd, &self.program)?;

        if !result.exists() {
            return Err(PortError::MissingOutput {
                program: self.program.clone(),
                path: result,
            });
        }
        info!(result = %result.display(), "Optimizer finished");
        Ok(result)
    }
}
