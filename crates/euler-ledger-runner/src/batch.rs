use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use euler_ledger_core::{
    duration_to_millis, now_utc, score_run, AnswerConfirmer, EulerError, Language, Ledger,
    ProblemId, RunObservation, ScoreReport, ScoreState, Toolchains,
};

use crate::harness::{build_and_run, Job};
use crate::locate::{solution_file_name, Workspace};

/// Counts for one batch. Every located pair lands in exactly one of
/// `failures`, `unconfirmed`, `recorded`, `faster`, `slower` or `incorrect`.
/// A pair whose winning answer could not be written to the ledger counts as
/// a failure; `write_errors` counts the individual failed writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub pairs_run: usize,
    pub failures: usize,
    pub unconfirmed: usize,
    pub recorded: usize,
    pub faster: usize,
    pub slower: usize,
    pub incorrect: usize,
    pub write_errors: usize,
}

pub struct BatchRunner<'a> {
    workspace: &'a Workspace,
    toolchains: &'a Toolchains,
    scratch_root: Option<PathBuf>,
}

impl<'a> BatchRunner<'a> {
    #[must_use]
    pub fn new(workspace: &'a Workspace, toolchains: &'a Toolchains) -> Self {
        Self {
            workspace,
            toolchains,
            scratch_root: None,
        }
    }

    #[must_use]
    pub fn with_scratch_root(mut self, scratch_root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(scratch_root.into());
        self
    }

    /// Runs every located (problem, language) pair in order and scores it.
    ///
    /// Per-pair failures are printed and counted; they never stop the batch.
    ///
    /// # Errors
    /// Returns an error only when writing to `out` fails.
    pub fn run<L, C, W>(
        &self,
        problems: &[ProblemId],
        ledger: &mut L,
        confirmer: &C,
        out: &mut W,
    ) -> Result<BatchSummary>
    where
        L: Ledger + ?Sized,
        C: AnswerConfirmer + ?Sized,
        W: Write + ?Sized,
    {
        let languages = self.workspace.detected_languages();
        tracing::debug!(
            root = %self.workspace.root().display(),
            languages = ?languages,
            problems = problems.len(),
            "starting batch"
        );

        let mut summary = BatchSummary::default();
        for problem in problems {
            for language in &languages {
                self.run_pair(*problem, *language, ledger, confirmer, out, &mut summary)?;
            }
        }

        if summary.pairs_run == 0 {
            writeln!(out, "No solutions found for the selected problems.")
                .context("failed to write batch output")?;
        }

        Ok(summary)
    }

    fn run_pair<L, C, W>(
        &self,
        problem: ProblemId,
        language: Language,
        ledger: &mut L,
        confirmer: &C,
        out: &mut W,
        summary: &mut BatchSummary,
    ) -> Result<()>
    where
        L: Ledger + ?Sized,
        C: AnswerConfirmer + ?Sized,
        W: Write + ?Sized,
    {
        let toolchain = self.toolchains.for_language(language);
        let Some(source) = self.workspace.locate(language, problem, toolchain) else {
            tracing::debug!(%problem, %language, "no solution file; skipping");
            return Ok(());
        };
        summary.pairs_run += 1;

        let workdir = self.workspace.problem_dir(language, problem);
        let include_dir = self.workspace.cpp_include_dir();
        let job = Job {
            problem,
            language,
            source: &source,
            workdir: &workdir,
            include_dir: &include_dir,
            scratch_root: self.scratch_root.as_deref(),
        };

        let file_name = solution_file_name(problem, toolchain.ext());
        let outcome = match build_and_run(toolchain, &job) {
            Ok(outcome) => outcome,
            Err(failure) => {
                summary.failures += 1;
                if let Some(partial) = &failure.partial {
                    write_run_block(
                        out,
                        &file_name,
                        language,
                        &partial.output,
                        duration_to_millis(partial.cpu_time),
                    )?;
                }
                return report_failure(out, &failure.error);
            }
        };

        let run = RunObservation {
            problem,
            language,
            output: outcome.output,
            elapsed_ms: duration_to_millis(outcome.cpu_time),
        };
        write_run_block(out, &file_name, language, &run.output, run.elapsed_ms)?;

        match score_run(ledger, confirmer, &run, now_utc()) {
            Ok(report) => write_decision(out, &run, &report, summary),
            Err(err) => {
                summary.failures += 1;
                tracing::warn!(%problem, %language, error = %format!("{err:#}"), "scoring failed");
                writeln!(out, "Error: {err:#}").context("failed to write batch output")
            }
        }
    }
}

fn report_failure<W: Write + ?Sized>(out: &mut W, err: &EulerError) -> Result<()> {
    tracing::warn!(error = %err, "solution failed");
    writeln!(out, "\n{err}").context("failed to write batch output")
}

fn write_run_block<W: Write + ?Sized>(
    out: &mut W,
    file_name: &str,
    language: Language,
    output: &str,
    elapsed_ms: f64,
) -> Result<()> {
    let header = format!("{file_name} ({language}): output:");
    writeln!(
        out,
        "\n{header}\n{}\n{output}\n{elapsed_ms:.3}ms execution time",
        "-".repeat(header.len()),
    )
    .context("failed to write batch output")
}

fn write_decision<W: Write + ?Sized>(
    out: &mut W,
    run: &RunObservation,
    report: &ScoreReport,
    summary: &mut BatchSummary,
) -> Result<()> {
    match &report.state {
        ScoreState::NoPriorRecord { confirmed: true } => {
            if report.solution_written {
                summary.recorded += 1;
                writeln!(out, "Recorded answer for problem {}.", run.problem)?;
            } else {
                summary.failures += 1;
            }
        }
        ScoreState::NoPriorRecord { confirmed: false } => {
            summary.unconfirmed += 1;
            writeln!(out, "Answer for problem {} not recorded.", run.problem)?;
        }
        ScoreState::Incorrect { .. } => {
            summary.incorrect += 1;
            if let Some(mismatch) = report.mismatch(run) {
                tracing::warn!(problem = %run.problem, language = %run.language, "answer mismatch");
                writeln!(out, "{mismatch}")?;
            }
        }
        ScoreState::CorrectFaster { .. } => {
            if report.solution_written {
                summary.faster += 1;
                writeln!(out, "New fastest time!")?;
            } else {
                summary.failures += 1;
            }
        }
        ScoreState::CorrectSlower { best_ms, holder } => {
            summary.slower += 1;
            writeln!(out, "Correct. Fastest time is {best_ms:.3}ms ({holder}).")?;
        }
    }

    for err in &report.write_errors {
        summary.write_errors += 1;
        writeln!(out, "Error: {err}")?;
    }

    Ok(())
}
