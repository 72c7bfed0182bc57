//! Builds and runs one solution, measuring the CPU time of the run.
//!
//! Compiled toolchains build into a scratch directory that is removed when
//! the call returns, whatever the outcome.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use euler_ledger_core::{EulerError, Language, ProblemId, Toolchain};

/// One (problem, language) pair ready to run.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub problem: ProblemId,
    pub language: Language,
    pub source: &'a Path,
    /// Working directory of the solution process.
    pub workdir: &'a Path,
    pub include_dir: &'a Path,
    /// Parent of the scratch build directory; the system temp dir when unset.
    pub scratch_root: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Stdout with surrounding whitespace removed.
    pub output: String,
    /// User plus system CPU time of the solution process.
    pub cpu_time: Duration,
}

/// A job that did not produce an answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct JobFailure {
    pub error: EulerError,
    /// Output and CPU time of a solution that ran but exited non-zero.
    pub partial: Option<RunOutcome>,
}

impl From<EulerError> for JobFailure {
    fn from(error: EulerError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// Builds (when the toolchain is compiled) and runs the job's source.
///
/// # Errors
/// Fails with [`EulerError::Build`] when the compiler cannot be spawned,
/// exits non-zero or prints diagnostics, and with [`EulerError::Execution`]
/// when the solution cannot be spawned or exits non-zero. A non-zero exit
/// keeps what the solution printed in [`JobFailure::partial`].
pub fn build_and_run(toolchain: &Toolchain, job: &Job<'_>) -> Result<RunOutcome, JobFailure> {
    match toolchain {
        Toolchain::Interpreted { interpreter, .. } => {
            let mut command = Command::new(interpreter);
            command.arg(job.source);
            run_measured(command, job)
        }
        Toolchain::Compiled {
            compiler, flags, ..
        } => {
            let scratch = scratch_dir(job)?;
            let binary = scratch.path().join(format!("problem_{}", job.problem));
            compile(compiler, flags, &binary, job)?;
            let outcome = run_measured(Command::new(&binary), job);
            drop(scratch);
            outcome
        }
    }
}

fn scratch_dir(job: &Job<'_>) -> Result<tempfile::TempDir, EulerError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pe-build-");
    let created = match job.scratch_root {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };
    created.map_err(|err| EulerError::Build {
        problem: job.problem,
        language: job.language,
        diagnostics: format!("failed to create build directory: {err}"),
    })
}

fn compile(
    compiler: &str,
    flags: &[String],
    binary: &Path,
    job: &Job<'_>,
) -> Result<(), EulerError> {
    let build_error = |diagnostics: String| EulerError::Build {
        problem: job.problem,
        language: job.language,
        diagnostics,
    };

    let mut command = Command::new(compiler);
    command
        .args(flags)
        .arg("-I")
        .arg(job.include_dir)
        .arg("-o")
        .arg(binary)
        .arg(job.source)
        .stdin(Stdio::null());
    tracing::debug!(command = ?command, "compiling solution");

    let output = command
        .output()
        .map_err(|err| build_error(format!("failed to spawn {compiler}: {err}")))?;

    let diagnostics = combined_diagnostics(&output);
    if !output.status.success() {
        return Err(build_error(format!(
            "{compiler} exited with {}: {diagnostics}",
            output.status
        )));
    }
    if !diagnostics.is_empty() {
        return Err(build_error(diagnostics));
    }

    Ok(())
}

fn combined_diagnostics(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn run_measured(mut command: Command, job: &Job<'_>) -> Result<RunOutcome, JobFailure> {
    let execution_error = |detail: String| EulerError::Execution {
        problem: job.problem,
        language: job.language,
        detail,
    };

    command
        .current_dir(job.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    tracing::debug!(command = ?command, "running solution");

    let clock = CpuClock::start().map_err(&execution_error)?;
    let output = command
        .output()
        .map_err(|err| execution_error(format!("failed to spawn solution: {err}")))?;
    let cpu_time = clock.elapsed().map_err(&execution_error)?;

    let outcome = RunOutcome {
        output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        cpu_time,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(JobFailure {
            error: execution_error(format!(
                "solution exited with {}: {}",
                output.status,
                stderr.trim()
            )),
            partial: Some(outcome),
        });
    }

    Ok(outcome)
}

/// Cumulative CPU time of reaped children, sampled around one spawn.
#[cfg(unix)]
struct CpuClock {
    before: Duration,
}

#[cfg(unix)]
impl CpuClock {
    fn start() -> Result<Self, String> {
        Ok(Self {
            before: children_cpu_time()?,
        })
    }

    fn elapsed(&self) -> Result<Duration, String> {
        Ok(children_cpu_time()?.saturating_sub(self.before))
    }
}

#[cfg(unix)]
fn children_cpu_time() -> Result<Duration, String> {
    use nix::sys::resource::{getrusage, UsageWho};
    use nix::sys::time::TimeValLike;

    let usage = getrusage(UsageWho::RUSAGE_CHILDREN)
        .map_err(|err| format!("failed to read child CPU usage: {err}"))?;
    let micros = usage.user_time().num_microseconds() + usage.system_time().num_microseconds();
    Ok(Duration::from_micros(u64::try_from(micros).unwrap_or(0)))
}

// Without child rusage the wall clock is the closest available measure.
#[cfg(not(unix))]
struct CpuClock {
    started: std::time::Instant,
}

#[cfg(not(unix))]
impl CpuClock {
    #[allow(clippy::unnecessary_wraps)]
    fn start() -> Result<Self, String> {
        Ok(Self {
            started: std::time::Instant::now(),
        })
    }

    #[allow(clippy::unnecessary_wraps)]
    fn elapsed(&self) -> Result<Duration, String> {
        Ok(self.started.elapsed())
    }
}
