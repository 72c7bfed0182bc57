use std::fmt::Write as _;

use anyhow::Result;
use euler_ledger_core::{format_rfc3339, LanguagePerfRecord, SolutionRecord};
use euler_ledger_store_sqlite::SqliteLedger;
use serde_json::{json, Map, Value};

/// Fixed-width dump of the global table followed by one table per language.
///
/// # Errors
/// Returns an error when a ledger listing fails.
pub fn render_text(ledger: &SqliteLedger) -> Result<String> {
    let mut text = String::new();
    write_solutions_table(&mut text, &ledger.list_solutions()?);
    for language in ledger.perf_languages()? {
        let _ = writeln!(text, "\n{}", language.as_str());
        write_perf_table(&mut text, &ledger.list_lang_perf(language)?);
    }
    Ok(text)
}

/// `{"solutions": [...], "languages": {"<language>": [...]}}`.
///
/// # Errors
/// Returns an error when a ledger listing or timestamp formatting fails.
pub fn render_json(ledger: &SqliteLedger) -> Result<Value> {
    let solutions = ledger
        .list_solutions()?
        .iter()
        .map(solution_json)
        .collect::<Result<Vec<_>>>()?;

    let mut languages = Map::new();
    for language in ledger.perf_languages()? {
        let rows = ledger
            .list_lang_perf(language)?
            .iter()
            .map(perf_json)
            .collect::<Result<Vec<_>>>()?;
        languages.insert(language.as_str().to_string(), Value::Array(rows));
    }

    Ok(json!({
        "solutions": solutions,
        "languages": languages,
    }))
}

fn write_solutions_table(text: &mut String, rows: &[SolutionRecord]) {
    text.push_str("Fastest Solutions:\n");
    text.push_str(" Problem Number |  Language  | Time (ms) \n");
    text.push_str("----------------+------------+-----------\n");
    for row in rows {
        let _ = writeln!(
            text,
            "{:>15} |{:>11} |{:>10}",
            row.id.get(),
            row.language.as_str(),
            format_millis(row.best_time_ms)
        );
    }
}

fn write_perf_table(text: &mut String, rows: &[LanguagePerfRecord]) {
    text.push_str(" Problem Number | Time (ms) \n");
    text.push_str("----------------+-----------\n");
    for row in rows {
        let _ = writeln!(
            text,
            "{:>15} |{:>10}",
            row.id.get(),
            format_millis(row.best_time_ms)
        );
    }
}

fn format_millis(value: f64) -> String {
    format!("{value:.3}")
}

fn solution_json(record: &SolutionRecord) -> Result<Value> {
    Ok(json!({
        "id": record.id,
        "language": record.language,
        "answer": record.answer,
        "best_time_ms": record.best_time_ms,
        "recorded_at": format_rfc3339(record.recorded_at)?,
    }))
}

fn perf_json(record: &LanguagePerfRecord) -> Result<Value> {
    Ok(json!({
        "id": record.id,
        "best_time_ms": record.best_time_ms,
        "recorded_at": format_rfc3339(record.recorded_at)?,
    }))
}
