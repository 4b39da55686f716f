//! # Bovespa Warehouse
//!
//! DuckDB-backed stages of the pipeline:
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`raw`] | Writes scraped rows as one raw parquet partition |
//! | [`transform`] | Rename, derive, aggregate and re-partition a raw partition |
//! | [`launcher`] | In-process job launcher running the transformer |
//! | [`queries`] | Canned summary queries over the refined table |
//! | [`validate`] | Raw, refined and catalog layout checks of one bucket |
//!
//! The [`Warehouse`] itself is the local catalog: registered parquet
//! locations become views that the guarded query layer can read.

pub mod duckdb;
pub mod launcher;
pub mod migrations;
pub mod queries;
pub mod raw;
pub mod transform;
pub mod validate;
pub mod views;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{Connection, ToSql};
use bovespa_core::{
    CatalogRegistration, PartitionDate, PipelineConfig, StoreError, UtcDateTime, ValidationError,
};
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use time::Date;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};
pub use launcher::LocalTransformLauncher;
pub use queries::{SummaryQuery, SummaryResult};
pub use raw::{RawWriteReport, RawWriter, UploadTarget};
pub use transform::{RefinedRecord, StagedPartition, TransformReport, Transformer};
pub use validate::{CheckStatus, LayoutCheck, LayoutValidator, ValidationReport};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Missing, unreadable or empty input. No output is written.
    #[error("data error: {0}")]
    Data(String),

    #[error("snapshot has no rows to write")]
    EmptySnapshot,

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            home: config.home.clone(),
            db_path: config.warehouse_db_path(),
            max_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    pub max_rows: usize,
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--max-rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "--query-timeout-ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<SqlColumn>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub truncated: bool,
}

impl QueryResult {
    /// Index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

/// Outcome of one transform job run, as stored in `transform_runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformRun {
    pub run_id: String,
    pub job_name: String,
    pub input_path: String,
    pub output_root: String,
    pub groups_written: usize,
    pub status: RunStatus,
    pub message: Option<String>,
    pub started_at: UtcDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("db_path", &self.config.db_path)
            .finish_non_exhaustive()
    }
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        let refreshed = views::refresh_catalog_views(&connection)?;
        tracing::debug!(
            home = %self.home().display(),
            db = %self.db_path().display(),
            refreshed,
            "warehouse initialized"
        );
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.home.as_path()
    }

    /// Upserts the catalog entry and recreates the table's view.
    pub fn register_table(&self, registration: &CatalogRegistration) -> Result<(), WarehouseError> {
        let partition_keys = serde_json::to_string(&registration.partition_keys)?;
        let columns = serde_json::to_string(&registration.columns)?;

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            connection.execute(
                r#"
INSERT OR REPLACE INTO catalog_tables (
    database_name, table_name, location, format, partition_keys, columns, registered_at
) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
"#,
                [
                    &registration.database as &dyn ToSql,
                    &registration.table,
                    &registration.location,
                    &registration.format,
                    &partition_keys,
                    &columns,
                ],
            )?;
            views::create_catalog_view(&connection, registration)
        })();

        finalize_transaction(&connection, result)?;
        tracing::info!(
            database = %registration.database,
            table = %registration.table,
            location = %registration.location,
            "catalog table registered"
        );
        Ok(())
    }

    /// Registers the refined layout rooted at `location` as `database.table`.
    pub fn register_refined(
        &self,
        database: &str,
        table: &str,
        location: &Path,
    ) -> Result<CatalogRegistration, WarehouseError> {
        let registration = CatalogRegistration::refined(database, table, path_to_sql(location))?;
        self.register_table(&registration)?;
        Ok(registration)
    }

    pub fn registered_tables(&self) -> Result<Vec<CatalogRegistration>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        load_registrations(&connection)
    }

    /// Appends one row to the `transform_runs` audit table.
    pub fn record_run(&self, run: &TransformRun) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let groups_written = i64::try_from(run.groups_written).unwrap_or(i64::MAX);
        let started_at = run.started_at.format_sql();
        connection.execute(
            r#"
INSERT INTO transform_runs (
    run_id, job_name, input_path, output_root, groups_written, status, message, started_at
) VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))
"#,
            [
                &run.run_id as &dyn ToSql,
                &run.job_name,
                &run.input_path,
                &run.output_root,
                &groups_written,
                &run.status.as_str(),
                &run.message,
                &started_at,
            ],
        )?;
        Ok(())
    }

    /// Runs one SELECT or CTE query on a read-only connection.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;
        enforce_read_only_query(sql)?;

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        execute_select_query(&connection, sql, guardrails, Instant::now())
    }
}

pub(crate) fn load_registrations(
    connection: &Connection,
) -> Result<Vec<CatalogRegistration>, WarehouseError> {
    let mut statement = connection.prepare(
        r#"
SELECT database_name, table_name, location, format, partition_keys, columns
FROM catalog_tables
ORDER BY database_name, table_name
"#,
    )?;
    let raw = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(
            |(database, table, location, format, partition_keys, columns)| {
                Ok(CatalogRegistration {
                    database,
                    table,
                    location,
                    format,
                    partition_keys: serde_json::from_str(&partition_keys)?,
                    columns: serde_json::from_str(&columns)?,
                })
            },
        )
        .collect()
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn execute_select_query(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    started: Instant,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only available once the statement has run.
    let _ = statement.query([] as [&dyn ToSql; 0])?;

    let column_count = statement.column_count();
    let columns = (0..column_count)
        .map(|index| SqlColumn {
            name: statement
                .column_name(index)
                .map(|name| name.to_string())
                .unwrap_or_else(|_| format!("column_{index}")),
            r#type: statement.column_type(index).to_string(),
        })
        .collect();

    let mut cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = cursor.next()? {
        ensure_timeout(started, guardrails.timeout())?;

        if rows.len() >= guardrails.max_rows {
            truncated = true;
            break;
        }
        rows.push(read_row(row, column_count)?);
    }

    ensure_timeout(started, guardrails.timeout())?;

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn read_row(row: &::duckdb::Row<'_>, column_count: usize) -> Result<Vec<Value>, ::duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_json_value(value));
    }
    Ok(output)
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map(|value| Value::Number(Number::from(value)))
            .unwrap_or_else(|_| Value::String(value.to_string())),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Blob(value) => Value::String(hex::encode(value)),
        DuckValue::Timestamp(unit, value) => timestamp_text(unit.to_micros(value)),
        DuckValue::Date32(days) => date_text(days),
        other => Value::String(format!("{other:?}")),
    }
}

fn timestamp_text(micros: i64) -> Value {
    UtcDateTime::from_unix_micros(micros).map_or_else(
        |_| Value::String(micros.to_string()),
        |instant| Value::String(instant.format_rfc3339()),
    )
}

/// DuckDB dates count days from 1970-01-01, Julian day 2 440 588.
fn date_text(days: i32) -> Value {
    Date::from_julian_day(2_440_588 + days)
        .map(|date| Value::String(PartitionDate::from_date(date).to_string()))
        .unwrap_or_else(|_| Value::String(days.to_string()))
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are accepted",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';')
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

pub(crate) fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Warehouse) {
        let temp = tempdir().expect("tempdir");
        let home = temp.path().join("bovespa-home");
        let db_path = home.join("catalog").join("warehouse.duckdb");
        let warehouse = Warehouse::open(WarehouseConfig {
            home,
            db_path,
            max_pool_size: 2,
        })
        .expect("warehouse open");
        (temp, warehouse)
    }

    #[test]
    fn initializes_catalog_tables() {
        let (_temp, warehouse) = open_temp();
        let query = warehouse
            .execute_query(
                "SELECT table_name FROM information_schema.tables WHERE table_name IN ('catalog_tables', 'transform_runs') ORDER BY table_name",
                QueryGuardrails::default(),
            )
            .expect("query");

        assert_eq!(query.row_count, 2);
        assert_eq!(query.rows[0][0], Value::String(String::from("catalog_tables")));
    }

    #[test]
    fn write_statements_are_rejected() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse
            .execute_query(
                "CREATE TABLE test_write (id INTEGER)",
                QueryGuardrails::default(),
            )
            .expect_err("should reject");

        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn stacked_statements_are_rejected() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse
            .execute_query(
                "SELECT 1; DROP TABLE catalog_tables",
                QueryGuardrails::default(),
            )
            .expect_err("should reject");

        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn max_rows_truncates_results() {
        let (_temp, warehouse) = open_temp();
        let result = warehouse
            .execute_query(
                "SELECT range AS n FROM range(10)",
                QueryGuardrails {
                    max_rows: 3,
                    query_timeout_ms: 5_000,
                },
            )
            .expect("query");

        assert_eq!(result.row_count, 3);
        assert!(result.truncated);
        assert_eq!(result.column_index("n"), Some(0));
    }

    #[test]
    fn records_transform_runs() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .record_run(&TransformRun {
                run_id: String::from("jr_test"),
                job_name: String::from("bovespa-etl-job"),
                input_path: String::from("/tmp/in.parquet"),
                output_root: String::from("/tmp/out"),
                groups_written: 3,
                status: RunStatus::Succeeded,
                message: None,
                started_at: UtcDateTime::parse("2026-10-16T18:30:00Z").expect("valid"),
            })
            .expect("record run");

        let result = warehouse
            .execute_query(
                "SELECT run_id, groups_written, status FROM transform_runs",
                QueryGuardrails::default(),
            )
            .expect("query");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][1], Value::from(3));
        assert_eq!(result.rows[0][2], Value::String(String::from("succeeded")));
    }

    #[test]
    fn temporal_values_render_as_iso_text() {
        let (_temp, warehouse) = open_temp();
        let result = warehouse
            .execute_query(
                "SELECT TIMESTAMP '2026-10-16 18:30:00' AS ts, DATE '2026-10-16' AS d",
                QueryGuardrails::default(),
            )
            .expect("query");

        assert_eq!(result.rows[0][0], Value::String(String::from("2026-10-16T18:30:00Z")));
        assert_eq!(result.rows[0][1], Value::String(String::from("2026-10-16")));
    }
}
