//! Domain model for the Project Euler solution ledger.
//!
//! The runner, the `SQLite` store and the CLI all build on the types here:
//! - [`parse_problem_selection`] turns CLI tokens into problem ids.
//! - [`Toolchains`] describes how each [`Language`] is built and run.
//! - [`score_run`] decides what a fresh run means for the [`Ledger`].

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

/// Upper bound on the number of problems a single selection may expand to.
pub const MAX_SELECTION_SIZE: usize = 100_000;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EulerError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("build error for problem {problem} ({language}): {diagnostics}")]
    Build {
        problem: ProblemId,
        language: Language,
        diagnostics: String,
    },
    #[error("execution error for problem {problem} ({language}): {detail}")]
    Execution {
        problem: ProblemId,
        language: Language,
        detail: String,
    },
    #[error("ledger write error: {0}")]
    LedgerWrite(String),
    #[error("incorrect answer {actual} for problem {problem}: correct answer is {expected}")]
    AnswerMismatch {
        problem: ProblemId,
        expected: String,
        actual: String,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("scrape error: {0}")]
    Scrape(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ProblemId(u32);

impl ProblemId {
    /// Builds a problem id, rejecting zero.
    ///
    /// # Errors
    /// Returns [`EulerError::Parse`] when `value` is zero.
    pub fn new(value: u32) -> Result<Self, EulerError> {
        if value == 0 {
            return Err(EulerError::Parse(
                "problem ids MUST be >= 1".to_string(),
            ));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Display for ProblemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProblemId {
    type Err = EulerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw
            .trim()
            .parse::<u32>()
            .map_err(|err| EulerError::Parse(format!("{raw} is not a valid integer: {err}")))?;
        Self::new(value)
    }
}

/// Parses problem tokens (`"7"` or inclusive `"3-9"`) into a sorted,
/// duplicate-free list.
///
/// # Errors
/// Returns [`EulerError::Parse`] when the list is empty, a token is neither an
/// integer nor a range, a range is reversed, or the union is too large. No
/// partial selection is produced on error.
pub fn parse_problem_selection<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<ProblemId>, EulerError> {
    if tokens.is_empty() {
        return Err(EulerError::Parse(
            "at least one problem or range is required".to_string(),
        ));
    }

    let mut selected = BTreeSet::new();
    for token in tokens {
        let (start, end) = parse_selection_token(token.as_ref())?;
        for id in start.get()..=end.get() {
            if selected.insert(ProblemId(id)) && selected.len() > MAX_SELECTION_SIZE {
                return Err(EulerError::Parse(format!(
                    "selection exceeds {MAX_SELECTION_SIZE} problems"
                )));
            }
        }
    }

    Ok(selected.into_iter().collect())
}

fn parse_selection_token(token: &str) -> Result<(ProblemId, ProblemId), EulerError> {
    let invalid = || EulerError::Parse(format!("{token} is not a valid integer or range"));

    let Some((start, end)) = token.split_once('-') else {
        let id = token.parse::<ProblemId>().map_err(|_| invalid())?;
        return Ok((id, id));
    };

    let start = start.parse::<ProblemId>().map_err(|_| invalid())?;
    let end = end.parse::<ProblemId>().map_err(|_| invalid())?;
    if start > end {
        return Err(EulerError::Parse(format!(
            "{token} is a reversed range: {start} > {end}"
        )));
    }

    Ok((start, end))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Language {
    #[serde(rename = "python")]
    Python,
    #[serde(rename = "c++")]
    Cpp,
}

impl Language {
    pub const ALL: [Self; 2] = [Self::Python, Self::Cpp];

    /// Directory name under the workspace root and the value stored in the
    /// ledger's `language` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Cpp => "c++",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "python" => Some(Self::Python),
            "c++" | "cpp" => Some(Self::Cpp),
            _ => None,
        }
    }

    /// Name of the per-language performance table. Always a bare SQL identifier.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Cpp => "cpp",
        }
    }

    #[must_use]
    pub fn comment_prefix(self) -> &'static str {
        match self {
            Self::Python => "#",
            Self::Cpp => "//",
        }
    }

    #[must_use]
    pub fn default_toolchain(self) -> Toolchain {
        match self {
            Self::Python => Toolchain::Interpreted {
                interpreter: "python3".to_string(),
                ext: "py".to_string(),
            },
            Self::Cpp => Toolchain::Compiled {
                compiler: "g++".to_string(),
                ext: "cpp".to_string(),
                flags: vec!["-O2".to_string()],
            },
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = EulerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw.trim()).ok_or_else(|| {
            EulerError::Parse(format!("{raw} is not a supported language"))
        })
    }
}

/// How a language's source file becomes a running process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Toolchain {
    Interpreted {
        interpreter: String,
        ext: String,
    },
    Compiled {
        compiler: String,
        ext: String,
        #[serde(default)]
        flags: Vec<String>,
    },
}

impl Toolchain {
    #[must_use]
    pub fn ext(&self) -> &str {
        match self {
            Self::Interpreted { ext, .. } | Self::Compiled { ext, .. } => ext,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Interpreted { interpreter, .. } => interpreter,
            Self::Compiled { compiler, .. } => compiler,
        }
    }

    #[must_use]
    pub fn is_compiled(&self) -> bool {
        matches!(self, Self::Compiled { .. })
    }

    fn validate(&self, language: Language) -> Result<(), EulerError> {
        if self.program().trim().is_empty() {
            return Err(EulerError::Configuration(format!(
                "{language} toolchain program MUST be provided"
            )));
        }

        let ext = self.ext();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EulerError::Configuration(format!(
                "{language} toolchain extension MUST be non-empty ASCII alphanumeric, got {ext:?}"
            )));
        }

        if let Self::Compiled { flags, .. } = self {
            if flags.iter().any(|flag| flag.trim().is_empty()) {
                return Err(EulerError::Configuration(format!(
                    "{language} compiler flags MUST NOT contain empty entries"
                )));
            }
        }

        Ok(())
    }
}

fn default_python_toolchain() -> Toolchain {
    Language::Python.default_toolchain()
}

fn default_cpp_toolchain() -> Toolchain {
    Language::Cpp.default_toolchain()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Toolchains {
    #[serde(default = "default_python_toolchain")]
    pub python: Toolchain,
    #[serde(default = "default_cpp_toolchain", rename = "c++", alias = "cpp")]
    pub cpp: Toolchain,
}

impl Default for Toolchains {
    fn default() -> Self {
        Self {
            python: default_python_toolchain(),
            cpp: default_cpp_toolchain(),
        }
    }
}

impl Toolchains {
    #[must_use]
    pub fn for_language(&self, language: Language) -> &Toolchain {
        match language {
            Language::Python => &self.python,
            Language::Cpp => &self.cpp,
        }
    }

    /// Validates every configured toolchain.
    ///
    /// # Errors
    /// Returns [`EulerError::Configuration`] when a program is blank, an
    /// extension is not alphanumeric, or a compiler flag is empty.
    pub fn validate(&self) -> Result<(), EulerError> {
        for language in Language::ALL {
            self.for_language(language).validate(language)?;
        }
        Ok(())
    }

    /// Decodes and validates toolchain overrides from JSON. Missing languages
    /// keep their defaults.
    ///
    /// # Errors
    /// Returns [`EulerError::Configuration`] when decoding fails or decoded
    /// values violate toolchain constraints.
    pub fn from_json(value: &Value) -> Result<Self, EulerError> {
        let toolchains: Self = serde_json::from_value(value.clone()).map_err(|err| {
            EulerError::Configuration(format!("invalid toolchain JSON payload: {err}"))
        })?;
        toolchains.validate()?;
        Ok(toolchains)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolutionRecord {
    pub id: ProblemId,
    pub language: Language,
    pub answer: String,
    pub best_time_ms: f64,
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguagePerfRecord {
    pub id: ProblemId,
    pub best_time_ms: f64,
    pub recorded_at: OffsetDateTime,
}

/// Persisted best answers and timings.
///
/// Each upsert is one logical update: it lands completely or not at all.
pub trait Ledger {
    #[allow(clippy::missing_errors_doc)]
    fn get(&self, problem: ProblemId) -> anyhow::Result<Option<SolutionRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn upsert_solution(&mut self, record: &SolutionRecord) -> anyhow::Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn get_lang_perf(
        &self,
        language: Language,
        problem: ProblemId,
    ) -> anyhow::Result<Option<LanguagePerfRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn upsert_lang_perf(
        &mut self,
        language: Language,
        record: &LanguagePerfRecord,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmRequest<'a> {
    pub problem: ProblemId,
    pub language: Language,
    pub output: &'a str,
    pub elapsed_ms: f64,
}

/// Decides whether a first-ever answer for a problem is correct.
pub trait AnswerConfirmer {
    #[allow(clippy::missing_errors_doc)]
    fn confirm(&self, request: &ConfirmRequest<'_>) -> anyhow::Result<bool>;
}

/// Declines every request without prompting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl AnswerConfirmer for DeclineAll {
    fn confirm(&self, _request: &ConfirmRequest<'_>) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunObservation {
    pub problem: ProblemId,
    pub language: Language,
    pub output: String,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreState {
    NoPriorRecord {
        confirmed: bool,
    },
    Incorrect {
        expected: String,
    },
    CorrectFaster {
        previous_best_ms: f64,
        previous_language: Language,
    },
    CorrectSlower {
        best_ms: f64,
        holder: Language,
    },
}

impl ScoreState {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPriorRecord { .. } => "no_prior_record",
            Self::Incorrect { .. } => "incorrect",
            Self::CorrectFaster { .. } => "correct_faster",
            Self::CorrectSlower { .. } => "correct_slower",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub state: ScoreState,
    pub solution_written: bool,
    pub lang_perf_written: bool,
    pub write_errors: Vec<EulerError>,
}

impl ScoreReport {
    fn new(state: ScoreState) -> Self {
        Self {
            state,
            solution_written: false,
            lang_perf_written: false,
            write_errors: Vec::new(),
        }
    }

    /// The mismatch error for an [`ScoreState::Incorrect`] run.
    #[must_use]
    pub fn mismatch(&self, run: &RunObservation) -> Option<EulerError> {
        match &self.state {
            ScoreState::Incorrect { expected } => Some(EulerError::AnswerMismatch {
                problem: run.problem,
                expected: expected.clone(),
                actual: run.output.clone(),
            }),
            _ => None,
        }
    }
}

/// Scores a finished run against the ledger and applies the resulting writes.
///
/// Ledger reads happen before any write so that a failed read leaves the
/// ledger untouched. Write failures are collected in
/// [`ScoreReport::write_errors`] instead of aborting.
///
/// # Errors
/// Returns an error when a ledger read or the confirmation prompt fails.
pub fn score_run<L, C>(
    ledger: &mut L,
    confirmer: &C,
    run: &RunObservation,
    now: OffsetDateTime,
) -> anyhow::Result<ScoreReport>
where
    L: Ledger + ?Sized,
    C: AnswerConfirmer + ?Sized,
{
    let prior = ledger
        .get(run.problem)
        .with_context(|| format!("failed to read ledger record for problem {}", run.problem))?;
    let lang_prior = ledger
        .get_lang_perf(run.language, run.problem)
        .with_context(|| {
            format!(
                "failed to read {} timing for problem {}",
                run.language, run.problem
            )
        })?;

    let lang_perf_update = match &lang_prior {
        Some(existing) if run.elapsed_ms >= existing.best_time_ms => None,
        _ => Some(LanguagePerfRecord {
            id: run.problem,
            best_time_ms: run.elapsed_ms,
            recorded_at: now,
        }),
    };

    let Some(prior) = prior else {
        let confirmed = confirmer.confirm(&ConfirmRequest {
            problem: run.problem,
            language: run.language,
            output: &run.output,
            elapsed_ms: run.elapsed_ms,
        })?;

        let mut report = ScoreReport::new(ScoreState::NoPriorRecord { confirmed });
        if confirmed {
            write_solution(
                ledger,
                &SolutionRecord {
                    id: run.problem,
                    language: run.language,
                    answer: run.output.clone(),
                    best_time_ms: run.elapsed_ms,
                    recorded_at: now,
                },
                &mut report,
            );
            if let Some(record) = lang_perf_update {
                write_lang_perf(ledger, run.language, &record, &mut report);
            }
        }
        return Ok(report);
    };

    if prior.answer != run.output {
        return Ok(ScoreReport::new(ScoreState::Incorrect {
            expected: prior.answer,
        }));
    }

    let mut report = if run.elapsed_ms < prior.best_time_ms {
        ScoreReport::new(ScoreState::CorrectFaster {
            previous_best_ms: prior.best_time_ms,
            previous_language: prior.language,
        })
    } else {
        ScoreReport::new(ScoreState::CorrectSlower {
            best_ms: prior.best_time_ms,
            holder: prior.language,
        })
    };

    if let Some(record) = lang_perf_update {
        write_lang_perf(ledger, run.language, &record, &mut report);
    }

    if matches!(report.state, ScoreState::CorrectFaster { .. }) {
        let record = SolutionRecord {
            language: run.language,
            best_time_ms: run.elapsed_ms,
            recorded_at: now,
            ..prior
        };
        write_solution(ledger, &record, &mut report);
    }

    Ok(report)
}

fn write_solution<L: Ledger + ?Sized>(
    ledger: &mut L,
    record: &SolutionRecord,
    report: &mut ScoreReport,
) {
    match ledger.upsert_solution(record) {
        Ok(()) => {
            tracing::info!(
                problem = %record.id,
                language = %record.language,
                best_time_ms = record.best_time_ms,
                "recorded solution"
            );
            report.solution_written = true;
        }
        Err(err) => {
            tracing::warn!(problem = %record.id, error = %format!("{err:#}"), "solution write failed");
            report.write_errors.push(EulerError::LedgerWrite(format!(
                "problem {}: {err:#}",
                record.id
            )));
        }
    }
}

fn write_lang_perf<L: Ledger + ?Sized>(
    ledger: &mut L,
    language: Language,
    record: &LanguagePerfRecord,
    report: &mut ScoreReport,
) {
    match ledger.upsert_lang_perf(language, record) {
        Ok(()) => {
            tracing::info!(
                problem = %record.id,
                language = %language,
                best_time_ms = record.best_time_ms,
                "recorded language timing"
            );
            report.lang_perf_written = true;
        }
        Err(err) => {
            tracing::warn!(problem = %record.id, language = %language, error = %format!("{err:#}"), "timing write failed");
            report.write_errors.push(EulerError::LedgerWrite(format!(
                "problem {} ({language}): {err:#}",
                record.id
            )));
        }
    }
}

/// Converts CPU time into the ledger's millisecond unit.
#[must_use]
pub fn duration_to_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`EulerError::Parse`] when parsing fails or the timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, EulerError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| EulerError::Parse(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(EulerError::Parse(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`EulerError::Parse`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, EulerError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| EulerError::Parse(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn ids(values: &[u32]) -> Vec<ProblemId> {
        values.iter().map(|value| must(ProblemId::new(*value))).collect()
    }

    fn fixture_now() -> OffsetDateTime {
        must(parse_rfc3339_utc("2026-02-07T12:00:00Z"))
    }

    #[derive(Default)]
    struct MemoryLedger {
        solutions: BTreeMap<ProblemId, SolutionRecord>,
        perf: BTreeMap<(Language, ProblemId), LanguagePerfRecord>,
        fail_writes: bool,
        writes: usize,
    }

    impl Ledger for MemoryLedger {
        fn get(&self, problem: ProblemId) -> anyhow::Result<Option<SolutionRecord>> {
            Ok(self.solutions.get(&problem).cloned())
        }

        fn upsert_solution(&mut self, record: &SolutionRecord) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk I/O error");
            }
            self.writes += 1;
            self.solutions.insert(record.id, record.clone());
            Ok(())
        }

        fn get_lang_perf(
            &self,
            language: Language,
            problem: ProblemId,
        ) -> anyhow::Result<Option<LanguagePerfRecord>> {
            Ok(self.perf.get(&(language, problem)).cloned())
        }

        fn upsert_lang_perf(
            &mut self,
            language: Language,
            record: &LanguagePerfRecord,
        ) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk I/O error");
            }
            self.writes += 1;
            self.perf.insert((language, record.id), record.clone());
            Ok(())
        }
    }

    struct Approve;

    impl AnswerConfirmer for Approve {
        fn confirm(&self, _request: &ConfirmRequest<'_>) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn observation(problem: u32, language: Language, output: &str, elapsed_ms: f64) -> RunObservation {
        RunObservation {
            problem: must(ProblemId::new(problem)),
            language,
            output: output.to_string(),
            elapsed_ms,
        }
    }

    fn seeded_ledger(answer: &str, best_time_ms: f64) -> MemoryLedger {
        let mut ledger = MemoryLedger::default();
        let id = must(ProblemId::new(1));
        ledger.solutions.insert(
            id,
            SolutionRecord {
                id,
                language: Language::Python,
                answer: answer.to_string(),
                best_time_ms,
                recorded_at: fixture_now(),
            },
        );
        ledger.perf.insert(
            (Language::Python, id),
            LanguagePerfRecord {
                id,
                best_time_ms,
                recorded_at: fixture_now(),
            },
        );
        ledger
    }

    #[test]
    fn selection_merges_singletons_and_ranges() {
        let selected = must(parse_problem_selection(&["5", "1-3", "3"]));
        assert_eq!(selected, ids(&[1, 2, 3, 5]));
    }

    #[test]
    fn selection_tolerates_whitespace_around_bounds() {
        let selected = must(parse_problem_selection(&[" 4 - 6 ", " 2"]));
        assert_eq!(selected, ids(&[2, 4, 5, 6]));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = match parse_problem_selection(&["1", "5-2"]) {
            Ok(value) => panic!("expected reversed range to fail, got {value:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, EulerError::Parse(_)));
        assert!(err.to_string().contains("reversed range"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["abc", "1-b", "-3", "4-", "1-2-3", "0", "2.5", ""] {
            assert!(
                matches!(parse_problem_selection(&[token]), Err(EulerError::Parse(_))),
                "expected {token:?} to be rejected"
            );
        }
    }

    #[test]
    fn empty_selection_is_rejected() {
        let tokens: [&str; 0] = [];
        assert!(parse_problem_selection(&tokens).is_err());
    }

    #[test]
    fn oversized_range_is_rejected() {
        assert!(parse_problem_selection(&["1-4000000000"]).is_err());
        assert!(parse_problem_selection(&["1-50000", "50001-100001"]).is_err());
    }

    #[test]
    fn overlapping_ranges_count_once_against_the_cap() {
        let selected = must(parse_problem_selection(&["1-60000", "1-60000", "59990-60010"]));
        assert_eq!(selected.len(), 60_010);
        assert_eq!(selected.first().map(|id| id.get()), Some(1));
        assert_eq!(selected.last().map(|id| id.get()), Some(60_010));

        let full = must(parse_problem_selection(&["1-100000", "100000"]));
        assert_eq!(full.len(), MAX_SELECTION_SIZE);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_selection_is_sorted_union(
            singles in prop::collection::vec(1u32..200, 0..8),
            ranges in prop::collection::vec((1u32..200, 0u32..20), 0..5),
        ) {
            let mut tokens: Vec<String> = singles.iter().map(ToString::to_string).collect();
            tokens.extend(ranges.iter().map(|(start, len)| format!("{start}-{}", start + len)));
            prop_assume!(!tokens.is_empty());

            let selected = must(parse_problem_selection(&tokens));

            let mut expected = BTreeSet::new();
            expected.extend(singles.iter().copied());
            for (start, len) in &ranges {
                expected.extend(*start..=start + len);
            }
            let actual: Vec<u32> = selected.iter().map(|id| id.get()).collect();
            prop_assert_eq!(actual, expected.into_iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn language_tags_round_trip() {
        for language in Language::ALL {
            assert_eq!(Language::parse(language.as_str()), Some(language));
        }
        assert_eq!(Language::parse("cpp"), Some(Language::Cpp));
        assert_eq!(Language::parse("rust"), None);
        assert_eq!(Language::Cpp.table_name(), "cpp");
    }

    #[test]
    fn toolchain_overrides_keep_missing_defaults() {
        let toolchains = must(Toolchains::from_json(&serde_json::json!({
            "python": { "kind": "interpreted", "interpreter": "pypy3", "ext": "py" }
        })));
        assert_eq!(toolchains.python.program(), "pypy3");
        assert_eq!(toolchains.cpp, Language::Cpp.default_toolchain());
        assert!(toolchains.cpp.is_compiled());
    }

    #[test]
    fn toolchain_validation_rejects_blank_program_and_bad_extension() {
        let blank = Toolchains::from_json(&serde_json::json!({
            "c++": { "kind": "compiled", "compiler": " ", "ext": "cpp" }
        }));
        assert!(matches!(blank, Err(EulerError::Configuration(_))));

        let bad_ext = Toolchains::from_json(&serde_json::json!({
            "python": { "kind": "interpreted", "interpreter": "python3", "ext": "p/y" }
        }));
        assert!(matches!(bad_ext, Err(EulerError::Configuration(_))));

        let unknown = Toolchains::from_json(&serde_json::json!({ "rust": {} }));
        assert!(matches!(unknown, Err(EulerError::Configuration(_))));
    }

    #[test]
    fn first_run_confirmed_creates_both_records() {
        let mut ledger = MemoryLedger::default();
        let run = observation(1, Language::Python, "233168", 12.5);

        let report = must(score_run(&mut ledger, &Approve, &run, fixture_now()));

        assert_eq!(report.state, ScoreState::NoPriorRecord { confirmed: true });
        assert!(report.solution_written && report.lang_perf_written);
        let record = must_some(must(ledger.get(run.problem)));
        assert_eq!(record.answer, "233168");
        assert_eq!(record.language, Language::Python);
        assert!((record.best_time_ms - 12.5).abs() < f64::EPSILON);
        let perf = must_some(must(ledger.get_lang_perf(Language::Python, run.problem)));
        assert!((perf.best_time_ms - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn first_run_declined_writes_nothing() {
        let mut ledger = MemoryLedger::default();
        let run = observation(1, Language::Python, "233168", 12.5);

        let report = must(score_run(&mut ledger, &DeclineAll, &run, fixture_now()));

        assert_eq!(report.state, ScoreState::NoPriorRecord { confirmed: false });
        assert_eq!(ledger.writes, 0);
        assert!(must(ledger.get(run.problem)).is_none());
    }

    #[test]
    fn faster_correct_run_replaces_global_record() {
        let mut ledger = seeded_ledger("233168", 50.0);
        let run = observation(1, Language::Cpp, "233168", 30.0);

        let report = must(score_run(&mut ledger, &DeclineAll, &run, fixture_now()));

        assert_eq!(
            report.state,
            ScoreState::CorrectFaster {
                previous_best_ms: 50.0,
                previous_language: Language::Python,
            }
        );
        let record = must_some(must(ledger.get(run.problem)));
        assert_eq!(record.language, Language::Cpp);
        assert!((record.best_time_ms - 30.0).abs() < f64::EPSILON);
        assert_eq!(record.answer, "233168");
        let perf = must_some(must(ledger.get_lang_perf(Language::Cpp, run.problem)));
        assert!((perf.best_time_ms - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn slower_correct_run_still_improves_its_language_table() {
        let mut ledger = seeded_ledger("233168", 5.0);
        let run = observation(1, Language::Cpp, "233168", 8.0);

        let report = must(score_run(&mut ledger, &DeclineAll, &run, fixture_now()));

        assert!(matches!(report.state, ScoreState::CorrectSlower { .. }));
        assert!(!report.solution_written);
        assert!(report.lang_perf_written);
        let record = must_some(must(ledger.get(run.problem)));
        assert_eq!(record.language, Language::Python);
        assert!((record.best_time_ms - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_rerun_is_idempotent() {
        let mut ledger = seeded_ledger("233168", 20.0);
        let run = observation(1, Language::Python, "233168", 20.0);

        let first = must(score_run(&mut ledger, &DeclineAll, &run, fixture_now()));
        let second = must(score_run(&mut ledger, &DeclineAll, &run, fixture_now()));

        assert_eq!(first, second);
        assert_eq!(ledger.writes, 0);
    }

    #[test]
    fn mismatch_reports_both_values_without_writing() {
        let mut ledger = seeded_ledger("233168", 50.0);
        let run = observation(1, Language::Python, "233170", 1.0);

        let report = must(score_run(&mut ledger, &Approve, &run, fixture_now()));

        assert_eq!(ledger.writes, 0);
        let mismatch = must_some(report.mismatch(&run));
        let message = mismatch.to_string();
        assert!(message.contains("233170"));
        assert!(message.contains("233168"));
    }

    #[test]
    fn write_failures_are_reported_not_raised() {
        let mut ledger = MemoryLedger {
            fail_writes: true,
            ..MemoryLedger::default()
        };
        let run = observation(3, Language::Python, "6857", 4.0);

        let report = must(score_run(&mut ledger, &Approve, &run, fixture_now()));

        assert_eq!(report.write_errors.len(), 2);
        assert!(report
            .write_errors
            .iter()
            .all(|err| matches!(err, EulerError::LedgerWrite(_))));
        assert!(!report.solution_written);
    }

    #[test]
    fn millis_conversion_uses_thousand_factor() {
        let millis = duration_to_millis(Duration::from_micros(1_500));
        assert!((millis - 1.5).abs() < 1e-9);
    }
}
