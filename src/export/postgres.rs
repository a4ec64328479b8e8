//! PostgreSQL export.
//!
//! The table has one `segment_id TEXT PRIMARY KEY` column and one TEXT
//! column per species. Rows are upserted in a single transaction so a
//! re-run replaces species columns it writes and leaves others alone.
//! Each export also appends a row to `<table>_runs`.
//!
//! The connection string comes from `DATABASE_URL`, usually via `.env`.

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::env;

use crate::model::PipelineError;
use crate::report::RunReport;
use crate::table::ProbabilityTable;

const MAX_IDENTIFIER_LEN: usize = 63;

fn db_error(context: &str, e: postgres::Error) -> PipelineError {
    PipelineError::Export(format!("{}: {}", context, e))
}

pub fn connect() -> Result<Client, PipelineError> {
    dotenv::dotenv().ok();
    let url = env::var("DATABASE_URL")
        .map_err(|_| PipelineError::Config("DATABASE_URL must be set for the postgres export".to_string()))?;
    Client::connect(&url, NoTls).map_err(|e| db_error("connect", e))
}

// ---------------------------------------------------------------------------
// SQL text
// ---------------------------------------------------------------------------

/// Table names are restricted to plain lower-case identifiers so they can be
/// used unquoted and suffixed (`<table>_runs`).
pub fn valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() + "_runs".len() <= MAX_IDENTIFIER_LEN
}

/// Species columns are always quoted, so only quotes, NUL and length are
/// a problem.
pub fn quote_column(name: &str) -> Result<String, PipelineError> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN || name.contains('"') || name.contains('\0') {
        return Err(PipelineError::Export(format!(
            "species name {:?} cannot be used as a column",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

fn create_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {} (segment_id TEXT PRIMARY KEY)", table)
}

fn add_column_sql(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} TEXT", table, column)
}

pub fn upsert_sql(table: &str, columns: &[String]) -> String {
    let mut names = vec!["segment_id".to_string()];
    names.extend(columns.iter().cloned());
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${}", i)).collect();

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (segment_id) DO ",
        table,
        names.join(", "),
        placeholders.join(", ")
    );
    if columns.is_empty() {
        sql.push_str("NOTHING");
    } else {
        let updates: Vec<String> = columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", c, c))
            .collect();
        sql.push_str("UPDATE SET ");
        sql.push_str(&updates.join(", "));
    }
    sql
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Upserts every row of `table`. Returns the number of rows written.
pub fn write_table(client: &mut Client, table_name: &str, table: &ProbabilityTable) -> Result<u64, PipelineError> {
    if !valid_table_name(table_name) {
        return Err(PipelineError::Config(format!("invalid postgres table name {:?}", table_name)));
    }
    let columns = table
        .species()
        .iter()
        .map(|s| quote_column(s))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tx = client.transaction().map_err(|e| db_error("begin", e))?;
    tx.execute(create_table_sql(table_name).as_str(), &[])
        .map_err(|e| db_error("create table", e))?;
    for column in &columns {
        tx.execute(add_column_sql(table_name, column).as_str(), &[])
            .map_err(|e| db_error("add column", e))?;
    }

    let stmt = tx
        .prepare(&upsert_sql(table_name, &columns))
        .map_err(|e| db_error("prepare upsert", e))?;

    let mut written = 0;
    for segment in table.segment_ids() {
        let mut cells: Vec<String> = vec![segment.clone()];
        if let Some(row) = table.row(segment) {
            cells.extend(row.into_iter().map(|(_, cell)| cell.to_string()));
        }
        let params: Vec<&(dyn ToSql + Sync)> = cells.iter().map(|c| c as &(dyn ToSql + Sync)).collect();
        written += tx.execute(&stmt, &params).map_err(|e| db_error("upsert", e))?;
    }

    tx.commit().map_err(|e| db_error("commit", e))?;
    Ok(written)
}

/// Appends the run summary to `<table>_runs`.
pub fn record_run(client: &mut Client, table_name: &str, report: &RunReport) -> Result<(), PipelineError> {
    if !valid_table_name(table_name) {
        return Err(PipelineError::Config(format!("invalid postgres table name {:?}", table_name)));
    }
    let runs = format!("{}_runs", table_name);
    client
        .execute(
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    run_at TIMESTAMPTZ NOT NULL,
                    segments BIGINT NOT NULL,
                    species_total BIGINT NOT NULL,
                    species_merged BIGINT NOT NULL,
                    species_failed BIGINT NOT NULL,
                    report TEXT NOT NULL
                )",
                runs
            )
            .as_str(),
            &[],
        )
        .map_err(|e| db_error("create runs table", e))?;

    let run_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&report.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let json = serde_json::to_string(report)
        .map_err(|e| PipelineError::Export(format!("report serialization: {}", e)))?;
    let s = &report.summary;

    client
        .execute(
            format!(
                "INSERT INTO {} (run_at, segments, species_total, species_merged, species_failed, report)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                runs
            )
            .as_str(),
            &[
                &run_at,
                &(report.segments as i64),
                &(s.species_total as i64),
                &(s.species_merged as i64),
                &(s.species_failed as i64),
                &json,
            ],
        )
        .map_err(|e| db_error("insert run record", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert!(valid_table_name("species_probability"));
        assert!(valid_table_name("_p2"));
        assert!(!valid_table_name("Species"));
        assert!(!valid_table_name("2probs"));
        assert!(!valid_table_name("probs; DROP TABLE x"));
        assert!(!valid_table_name(""));
        assert!(!valid_table_name(&"a".repeat(60)));
    }

    #[test]
    fn test_species_columns_are_quoted() {
        assert_eq!(quote_column("Hardhead-CA").unwrap(), "\"Hardhead-CA\"");
        assert!(quote_column("bad\"name").is_err());
        assert!(quote_column("").is_err());
    }

    #[test]
    fn test_upsert_updates_only_written_columns() {
        let sql = upsert_sql("probs", &["\"hardhead\"".to_string(), "\"chinook\"".to_string()]);
        assert_eq!(
            sql,
            "INSERT INTO probs (segment_id, \"hardhead\", \"chinook\") VALUES ($1, $2, $3) \
             ON CONFLICT (segment_id) DO UPDATE SET \"hardhead\" = EXCLUDED.\"hardhead\", \
             \"chinook\" = EXCLUDED.\"chinook\""
        );
    }

    #[test]
    fn test_upsert_without_species_keeps_existing_rows() {
        assert!(upsert_sql("probs", &[]).ends_with("DO NOTHING"));
    }
}
