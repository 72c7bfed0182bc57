//! `pe`: runs Project Euler solutions and keeps the fastest correct answers.
//!
//! - [`run_cli`] executes a parsed [`Cli`].
//! - [`StdinConfirmer`] asks on the terminal before a first answer is recorded.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use euler_ledger_core::{
    parse_problem_selection, AnswerConfirmer, ConfirmRequest, DeclineAll, EulerError, Language,
    ProblemId, Toolchains,
};
use euler_ledger_runner::{BatchRunner, Workspace};
use euler_ledger_store_sqlite::SqliteLedger;

pub mod report;
pub mod scrape;
pub mod setup;

use setup::{HttpFetcher, SetupPlan, DEFAULT_BASE_URL};

const DEFAULT_DB_FILE: &str = "solutions.db";

#[derive(Debug, Parser)]
#[command(name = "pe")]
#[command(about = "Project Euler solution runner and ledger")]
pub struct Cli {
    /// Workspace root holding one directory per language.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Ledger database; defaults to `<root>/solutions.db`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON file overriding how languages are built and run.
    #[arg(long)]
    toolchains: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run solutions and score them against the ledger.
    Run(RunArgs),
    /// Print the ledger tables.
    Report(ReportArgs),
    /// Fetch problem statements and scaffold solution directories.
    Setup(SetupArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Problem numbers or inclusive ranges such as `3-9`.
    #[arg(required = true, num_args = 1..)]
    problems: Vec<String>,

    /// Never prompt; first answers are not recorded.
    #[arg(long, default_value_t = false)]
    non_interactive: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    #[arg(long, value_name = "S")]
    start_problem: u32,
    #[arg(long, value_name = "N", default_value_t = 10)]
    num_problems: u32,
    #[arg(long, value_delimiter = ',', default_value = "python")]
    languages: Vec<Language>,
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

/// Executes the parsed command.
///
/// # Errors
/// Returns an error on an invalid problem selection, an invalid toolchain
/// file, a ledger that cannot be opened, or a failed setup or report.
/// Failures of individual solutions are printed, not returned.
pub fn run_cli(cli: Cli) -> Result<()> {
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| cli.root.join(DEFAULT_DB_FILE));
    let toolchains = load_toolchains(cli.toolchains.as_deref())?;
    let workspace = Workspace::new(&cli.root);

    match cli.command {
        Command::Run(args) => {
            let problems = parse_problem_selection(&args.problems)?;
            let mut ledger = open_ledger(&db_path)?;
            let confirmer: Box<dyn AnswerConfirmer> = if args.non_interactive {
                Box::new(DeclineAll)
            } else {
                Box::new(StdinConfirmer)
            };

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let summary = BatchRunner::new(&workspace, &toolchains).run(
                &problems,
                &mut ledger,
                confirmer.as_ref(),
                &mut out,
            )?;
            tracing::info!(?summary, "batch finished");
            Ok(())
        }
        Command::Report(args) => {
            let ledger = open_ledger(&db_path)?;
            let rendered = if args.json {
                serde_json::to_string_pretty(&report::render_json(&ledger)?)?
            } else {
                report::render_text(&ledger)?
            };

            match args.output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("failed writing report to {}", path.display()))?,
                None => print!("{rendered}"),
            }
            Ok(())
        }
        Command::Setup(args) => {
            let plan = SetupPlan {
                start_problem: ProblemId::new(args.start_problem)?,
                num_problems: args.num_problems,
                languages: args.languages,
                base_url: args.base_url,
                db_path,
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            setup::run_setup(
                &plan,
                &workspace,
                &toolchains,
                &HttpFetcher::new(),
                &mut out,
            )
        }
    }
}

fn open_ledger(path: &Path) -> Result<SqliteLedger> {
    let ledger = SqliteLedger::open(path)?;
    ledger.migrate()?;
    Ok(ledger)
}

/// Default toolchains, or the validated overrides from `path`.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a valid
/// toolchain document.
pub fn load_toolchains(path: Option<&Path>) -> Result<Toolchains> {
    let Some(path) = path else {
        return Ok(Toolchains::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read toolchains from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
        EulerError::Configuration(format!("{} is not valid JSON: {err}", path.display()))
    })?;
    let toolchains = Toolchains::from_json(&value)?;
    tracing::debug!(path = %path.display(), "loaded toolchain overrides");
    Ok(toolchains)
}

/// Asks on stderr and reads the answer from stdin; `y` or `yes` accepts.
pub struct StdinConfirmer;

impl AnswerConfirmer for StdinConfirmer {
    fn confirm(&self, request: &ConfirmRequest<'_>) -> Result<bool> {
        std::io::stdout().flush()?;
        eprint!(
            "Correct solution to problem {} ({})? (Enter 'y' to record): ",
            request.problem, request.language
        );
        std::io::stderr().flush()?;

        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }
}

fn is_affirmative(answer: &str) -> bool {
    let normalized = answer.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "y" | "yes")
}
