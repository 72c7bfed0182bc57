use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use euler_ledger_core::{EulerError, Language, ProblemId, Toolchains};
use euler_ledger_runner::{solution_file_name, Workspace};
use euler_ledger_store_sqlite::SqliteLedger;

use crate::scrape::{data_file_name, looks_like_html_page, parse_problem_page, resolve_link};

pub const DEFAULT_BASE_URL: &str = "https://projecteuler.net";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Source of problem pages and data files.
pub trait Fetcher {
    #[allow(clippy::missing_errors_doc)]
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "fetching");
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!(EulerError::Scrape(format!(
                    "GET {url} returned http status {code}"
                ))));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!(EulerError::Scrape(format!(
                    "GET {url} failed: {err}"
                ))));
            }
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .with_context(|| format!("failed reading response body from {url}"))?;
        Ok(body)
    }
}

#[derive(Debug, Clone)]
pub struct SetupPlan {
    pub start_problem: ProblemId,
    pub num_problems: u32,
    pub languages: Vec<Language>,
    pub base_url: String,
    pub db_path: PathBuf,
}

struct DataFile {
    name: String,
    body: Vec<u8>,
}

/// Scaffolds problem directories, statements and data files under the
/// workspace root, then initializes the ledger.
///
/// # Errors
/// Returns an error when the root is not a directory, a page cannot be
/// fetched or parsed, a file cannot be written, or the ledger cannot be
/// opened.
pub fn run_setup<F, W>(
    plan: &SetupPlan,
    workspace: &Workspace,
    toolchains: &Toolchains,
    fetcher: &F,
    out: &mut W,
) -> Result<()>
where
    F: Fetcher + ?Sized,
    W: Write + ?Sized,
{
    if !workspace.root().is_dir() {
        return Err(anyhow!(EulerError::Configuration(format!(
            "root {} is not an existing directory",
            workspace.root().display()
        ))));
    }

    for language in &plan.languages {
        ensure_dir(&workspace.language_dir(*language))?;
    }
    let doc_dir = workspace.root().join("doc");
    ensure_dir(&doc_dir)?;

    let first = plan.start_problem.get();
    let last = first.saturating_add(plan.num_problems);
    for raw in first..last {
        let problem = ProblemId::new(raw)?;
        setup_problem(plan, workspace, toolchains, fetcher, &doc_dir, problem, out)?;
    }

    let ledger = SqliteLedger::open(&plan.db_path)?;
    ledger.migrate()?;
    writeln!(out, "Ledger ready at {}", plan.db_path.display())?;

    Ok(())
}

fn setup_problem<F, W>(
    plan: &SetupPlan,
    workspace: &Workspace,
    toolchains: &Toolchains,
    fetcher: &F,
    doc_dir: &Path,
    problem: ProblemId,
    out: &mut W,
) -> Result<()>
where
    F: Fetcher + ?Sized,
    W: Write + ?Sized,
{
    let base_url = plan.base_url.trim_end_matches('/');
    let page = fetcher.fetch(&format!("{base_url}/problem={problem}"))?;
    let page = String::from_utf8_lossy(&page);
    let parsed =
        parse_problem_page(&page).with_context(|| format!("failed to parse problem {problem}"))?;
    let description = parsed.description;
    let data_files = fetch_data_files(fetcher, base_url, &parsed.links)?;

    for language in &plan.languages {
        let dir = workspace.problem_dir(*language, problem);
        if dir.exists() {
            writeln!(out, "{} already exists; skipping", dir.display())?;
            continue;
        }
        std::fs::create_dir(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let ext = toolchains.for_language(*language).ext();
        let template_path = dir.join(solution_file_name(problem, ext));
        std::fs::write(&template_path, template(*language, problem, &description))
            .with_context(|| format!("failed to write {}", template_path.display()))?;

        for file in &data_files {
            let path = dir.join(&file.name);
            std::fs::write(&path, &file.body)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        writeln!(out, "Created {}", template_path.display())?;
    }

    let doc_path = doc_dir.join(format!("problem_{problem}.txt"));
    std::fs::write(&doc_path, &description)
        .with_context(|| format!("failed to write {}", doc_path.display()))?;
    tracing::info!(%problem, data_files = data_files.len(), "problem scaffolded");

    Ok(())
}

fn fetch_data_files<F: Fetcher + ?Sized>(
    fetcher: &F,
    base_url: &str,
    links: &[String],
) -> Result<Vec<DataFile>> {
    let mut files = Vec::new();
    for link in links {
        let Some(name) = data_file_name(link) else {
            tracing::debug!(link, "link has no usable file name; ignoring");
            continue;
        };
        let body = fetcher.fetch(&resolve_link(base_url, link))?;
        if looks_like_html_page(&body) {
            continue;
        }
        files.push(DataFile { name, body });
    }
    Ok(files)
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!(EulerError::Configuration(format!(
                "{} already exists and is not a directory",
                path.display()
            ))));
        }
        return Ok(());
    }
    std::fs::create_dir(path).with_context(|| format!("failed to create {}", path.display()))
}

fn template(language: Language, problem: ProblemId, description: &str) -> String {
    let prefix = language.comment_prefix();
    let header = description
        .lines()
        .map(|line| format!("{prefix} {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    match language {
        Language::Python => format!(
            "{prefix} Project Euler Problem {problem}\n{header}\n\n\
             import sys\n\n\n\
             def main():\n    print(\"TODO\")\n\n\n\
             if __name__ == \"__main__\":\n    sys.exit(main())\n"
        ),
        Language::Cpp => format!(
            "{prefix} Project Euler Problem {problem}\n{header}\n\n\
             #include <iostream>\n\n\
             int main() {{\n    std::cout << \"TODO\" << std::endl;\n    return 0;\n}}\n"
        ),
    }
}
