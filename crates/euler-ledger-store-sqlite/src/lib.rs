#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use euler_ledger_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, EulerError, Language, LanguagePerfRecord, Ledger,
    ProblemId, SolutionRecord,
};
use rusqlite::{params, Connection, OptionalExtension};

const LEDGER_MIGRATION_VERSION: i64 = 1;

const SCHEMA_LEDGER_V1: &str = r"
CREATE TABLE IF NOT EXISTS solutions (
  id INTEGER PRIMARY KEY CHECK (id >= 1),
  language TEXT NOT NULL CHECK (language IN ('python', 'c++')),
  answer TEXT NOT NULL,
  speed REAL NOT NULL CHECK (speed >= 0.0),
  recorded_at TEXT NOT NULL
);
";

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_LEDGER_V1)
            .context("failed to apply ledger schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![LEDGER_MIGRATION_VERSION, now],
            )
            .context("failed to register ledger schema migration")?;

        Ok(())
    }

    /// All global records ordered by problem id.
    pub fn list_solutions(&self) -> Result<Vec<SolutionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, language, answer, speed, recorded_at
             FROM solutions
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], parse_solution_row)?;
        collect_rows(rows)
    }

    /// Per-language records ordered by problem id. Empty when the language
    /// has never recorded a timing.
    pub fn list_lang_perf(&self, language: Language) -> Result<Vec<LanguagePerfRecord>> {
        if !table_exists(&self.conn, language.table_name())? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, speed, recorded_at FROM \"{}\" ORDER BY id ASC",
            language.table_name()
        ))?;

        let rows = stmt.query_map([], parse_lang_perf_row)?;
        collect_rows(rows)
    }

    /// Languages whose performance table has been created.
    pub fn perf_languages(&self) -> Result<Vec<Language>> {
        let mut languages = Vec::new();
        for language in Language::ALL {
            if table_exists(&self.conn, language.table_name())? {
                languages.push(language);
            }
        }
        Ok(languages)
    }

    fn ensure_lang_table(&self, language: Language) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                    id INTEGER PRIMARY KEY CHECK (id >= 1),
                    speed REAL NOT NULL CHECK (speed >= 0.0),
                    recorded_at TEXT NOT NULL
                 );",
                language.table_name()
            ))
            .with_context(|| format!("failed to create {} timing table", language))?;
        Ok(())
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Ledger for SqliteLedger {
    fn get(&self, problem: ProblemId) -> Result<Option<SolutionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, language, answer, speed, recorded_at
             FROM solutions
             WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![i64::from(problem.get())], parse_solution_row)
            .optional()?;

        Ok(row)
    }

    fn upsert_solution(&mut self, record: &SolutionRecord) -> Result<()> {
        let recorded_at =
            format_rfc3339(record.recorded_at).map_err(|err| anyhow!(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start solution transaction")?;

        tx.execute(
            "INSERT INTO solutions(id, language, answer, speed, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               language = excluded.language,
               answer = excluded.answer,
               speed = excluded.speed,
               recorded_at = excluded.recorded_at",
            params![
                i64::from(record.id.get()),
                record.language.as_str(),
                record.answer,
                record.best_time_ms,
                recorded_at,
            ],
        )
        .with_context(|| format!("failed to upsert solution for problem {}", record.id))?;

        tx.commit().context("failed to commit solution transaction")?;
        tracing::debug!(problem = %record.id, "solution row committed");

        Ok(())
    }

    fn get_lang_perf(
        &self,
        language: Language,
        problem: ProblemId,
    ) -> Result<Option<LanguagePerfRecord>> {
        if !table_exists(&self.conn, language.table_name())? {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, speed, recorded_at FROM \"{}\" WHERE id = ?1",
            language.table_name()
        ))?;

        let row = stmt
            .query_row(params![i64::from(problem.get())], parse_lang_perf_row)
            .optional()?;

        Ok(row)
    }

    fn upsert_lang_perf(&mut self, language: Language, record: &LanguagePerfRecord) -> Result<()> {
        self.ensure_lang_table(language)?;
        let recorded_at =
            format_rfc3339(record.recorded_at).map_err(|err| anyhow!(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start timing transaction")?;

        tx.execute(
            &format!(
                "INSERT INTO \"{}\"(id, speed, recorded_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                   speed = excluded.speed,
                   recorded_at = excluded.recorded_at",
                language.table_name()
            ),
            params![i64::from(record.id.get()), record.best_time_ms, recorded_at],
        )
        .with_context(|| {
            format!(
                "failed to upsert {} timing for problem {}",
                language, record.id
            )
        })?;

        tx.commit().context("failed to commit timing transaction")?;
        tracing::debug!(problem = %record.id, language = %language, "timing row committed");

        Ok(())
    }
}

fn parse_solution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SolutionRecord> {
    let id_i64: i64 = row.get(0)?;
    let language_raw: String = row.get(1)?;
    let recorded_at_raw: String = row.get(4)?;

    let language = Language::parse(&language_raw).ok_or_else(|| {
        to_sql_error(EulerError::Parse(format!(
            "unknown language in ledger: {language_raw}"
        )))
    })?;

    Ok(SolutionRecord {
        id: parse_problem_id(id_i64)?,
        language,
        answer: row.get(2)?,
        best_time_ms: row.get(3)?,
        recorded_at: parse_rfc3339_utc(&recorded_at_raw).map_err(to_sql_error)?,
    })
}

fn parse_lang_perf_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LanguagePerfRecord> {
    let id_i64: i64 = row.get(0)?;
    let recorded_at_raw: String = row.get(2)?;

    Ok(LanguagePerfRecord {
        id: parse_problem_id(id_i64)?,
        best_time_ms: row.get(1)?,
        recorded_at: parse_rfc3339_utc(&recorded_at_raw).map_err(to_sql_error)?,
    })
}

fn parse_problem_id(raw: i64) -> rusqlite::Result<ProblemId> {
    let value = u32::try_from(raw).map_err(|_| {
        to_sql_error(EulerError::Parse(format!(
            "problem id out of range in ledger: {raw}"
        )))
    })?;
    ProblemId::new(value).map_err(to_sql_error)
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1
             LIMIT 1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .context("failed to query sqlite_master")?
        .is_some();

    Ok(exists)
}

fn to_sql_error(err: EulerError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
