//! Running the external solver on a written bundle.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{ResultsError, ResultsResult};

/// Exit code reported when the solver was killed by a signal.
const KILLED: i32 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The solver executable, `ribasim` unless configured otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Solver {
    pub exe: PathBuf,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            exe: PathBuf::from("ribasim"),
        }
    }
}

impl Solver {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Run the solver with `toml_path` as its only argument.
    ///
    /// Every stdout line is forwarded as an `info` event while the solver
    /// runs; stderr goes to the terminal. Returns the exit code, also when
    /// it's not zero.
    pub fn run(&self, toml_path: &Path) -> ResultsResult<RunOutcome> {
        if !toml_path.exists() {
            return Err(ResultsError::InvalidPath {
                message: format!("{} does not exist", toml_path.display()),
            });
        }
        let started = Instant::now();
        let mut child = Command::new(&self.exe)
            .arg(toml_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ResultsError::SolverNotStarted {
                exe: self.exe.display().to_string(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    info!(target: "ribasim", "{line}");
                }
            }
        }
        let status = child.wait()?;
        let exit_code = status.code().unwrap_or(KILLED);
        let outcome = RunOutcome {
            exit_code,
            duration: started.elapsed(),
        };
        if outcome.success() {
            info!(path = %toml_path.display(), seconds = outcome.duration.as_secs_f64(), "solver finished");
        } else {
            warn!(path = %toml_path.display(), exit_code, "solver failed");
        }
        Ok(outcome)
    }

    /// [`Solver::run`], with a non-zero exit code as an error.
    pub fn run_checked(&self, toml_path: &Path) -> ResultsResult<RunOutcome> {
        let outcome = self.run(toml_path)?;
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(ResultsError::SolverFailed {
                exit_code: outcome.exit_code,
            })
        }
    }

    /// First line of `<exe> --version`, if the solver answers.
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.exe).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
    }
}
