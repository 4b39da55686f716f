//! # Layout Validation
//!
//! Inspects one bucket of the local object store after a pipeline run:
//!
//! | Check | Passes when |
//! |-------|-------------|
//! | `raw_layout` | raw files sit under `year=/month=/day=`, carry the raw columns and match their key's date |
//! | `refined_layout` | refined files add a `class=` level, carry the catalog columns and match their key's date |
//! | `catalog` | the refined table is registered at the bucket's refined location and answers a query |
//!
//! Problems found inside the bucket are reported as issues on the check,
//! never as errors.

use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection};
use bovespa_core::catalog::{refined_columns, validate_identifier, REFINED_PARTITION_KEYS};
use bovespa_core::domain::{normalize_prefix, REFINED_PART_FILE};
use bovespa_core::PartitionDate;
use serde::Serialize;

use crate::transform::REQUIRED_COLUMNS;
use crate::{escape_sql_string, path_to_sql, QueryGuardrails, Warehouse, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl LayoutCheck {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn detail(&mut self, detail: impl Into<String>) {
        self.details.push(detail.into());
    }

    fn issue(&mut self, issue: impl Into<String>) {
        self.status = CheckStatus::Fail;
        self.issues.push(issue.into());
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub bucket_root: PathBuf,
    pub checks: Vec<LayoutCheck>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(LayoutCheck::passed)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &LayoutCheck> {
        self.checks.iter().filter(|check| !check.passed())
    }
}

#[derive(Debug, Clone)]
struct CatalogTarget<'a> {
    warehouse: &'a Warehouse,
    database: String,
    table: String,
}

/// Validates the raw and refined layout of one bucket directory.
#[derive(Debug, Clone)]
pub struct LayoutValidator<'a> {
    bucket_root: PathBuf,
    raw_prefix: String,
    refined_prefix: String,
    catalog: Option<CatalogTarget<'a>>,
}

impl<'a> LayoutValidator<'a> {
    pub fn new(bucket_root: impl Into<PathBuf>) -> Self {
        Self {
            bucket_root: bucket_root.into(),
            raw_prefix: String::from("raw-data/"),
            refined_prefix: String::from("refined-data/"),
            catalog: None,
        }
    }

    pub fn with_prefixes(mut self, raw_prefix: &str, refined_prefix: &str) -> Self {
        self.raw_prefix = normalize_prefix(raw_prefix);
        self.refined_prefix = normalize_prefix(refined_prefix);
        self
    }

    /// Also checks the catalog entry `database.table` in `warehouse`.
    pub fn with_catalog(mut self, warehouse: &'a Warehouse, database: &str, table: &str) -> Self {
        self.catalog = Some(CatalogTarget {
            warehouse,
            database: database.to_owned(),
            table: table.to_owned(),
        });
        self
    }

    pub fn validate(&self) -> Result<ValidationReport, WarehouseError> {
        let inspector = Connection::open_in_memory()?;
        inspector.execute_batch("PRAGMA disable_progress_bar; SET threads TO 1;")?;

        let mut checks = vec![
            self.check_raw(&inspector)?,
            self.check_refined(&inspector)?,
        ];
        if let Some(catalog) = &self.catalog {
            checks.push(self.check_catalog(catalog)?);
        }

        let report = ValidationReport {
            bucket_root: self.bucket_root.clone(),
            checks,
        };
        tracing::info!(
            bucket_root = %self.bucket_root.display(),
            passed = report.passed(),
            failed = report.failed_checks().count(),
            "layout validated"
        );
        Ok(report)
    }

    fn check_raw(&self, inspector: &Connection) -> Result<LayoutCheck, WarehouseError> {
        let mut check = LayoutCheck::new("raw_layout");
        let files = self.parquet_keys(&self.raw_prefix)?;
        if files.is_empty() {
            check.issue(format!("no parquet files under '{}'", self.raw_prefix));
            return Ok(check);
        }
        check.detail(format!("{} raw file(s)", files.len()));

        for (key, path) in files {
            let Some(date) = PartitionDate::from_key(&key) else {
                check.issue(format!("'{key}' is not under year=/month=/day="));
                continue;
            };
            inspect_file(inspector, &mut check, &key, &path, date, &REQUIRED_COLUMNS)?;
        }
        Ok(check)
    }

    fn check_refined(&self, inspector: &Connection) -> Result<LayoutCheck, WarehouseError> {
        let mut check = LayoutCheck::new("refined_layout");
        let files = self.parquet_keys(&self.refined_prefix)?;
        if files.is_empty() {
            check.issue(format!("no parquet files under '{}'", self.refined_prefix));
            return Ok(check);
        }
        check.detail(format!("{} refined file(s)", files.len()));

        let expected = refined_columns();
        let columns: Vec<&str> = expected.iter().map(|column| column.name.as_str()).collect();

        for (key, path) in files {
            let Some(date) = PartitionDate::from_key(&key) else {
                check.issue(format!("'{key}' is not under year=/month=/day="));
                continue;
            };
            if !key.split('/').any(|segment| segment.starts_with("class=")) {
                check.issue(format!("'{key}' has no class= level"));
                continue;
            }
            if !key.ends_with(REFINED_PART_FILE) {
                check.issue(format!("'{key}' is not named {REFINED_PART_FILE}"));
            }
            inspect_file(inspector, &mut check, &key, &path, date, &columns)?;
        }
        Ok(check)
    }

    fn check_catalog(&self, catalog: &CatalogTarget<'_>) -> Result<LayoutCheck, WarehouseError> {
        let mut check = LayoutCheck::new("catalog");
        let registrations = catalog.warehouse.registered_tables()?;
        let Some(registration) = registrations
            .iter()
            .find(|entry| entry.database == catalog.database && entry.table == catalog.table)
        else {
            check.issue(format!(
                "'{}.{}' is not registered",
                catalog.database, catalog.table
            ));
            return Ok(check);
        };
        check.detail(format!("'{}.{}' registered", catalog.database, catalog.table));

        let location = path_to_sql(&self.bucket_root.join(&self.refined_prefix));
        if registration.location.trim_end_matches('/') != location.trim_end_matches('/') {
            check.issue(format!(
                "location '{}' differs from '{location}'",
                registration.location
            ));
        }
        if registration.partition_keys != REFINED_PARTITION_KEYS {
            check.issue(format!(
                "partition keys {:?} differ from {REFINED_PARTITION_KEYS:?}",
                registration.partition_keys
            ));
        }

        validate_identifier(&catalog.table)?;
        let sql = format!("SELECT COUNT(*) AS row_count FROM {}", catalog.table);
        match catalog
            .warehouse
            .execute_query(&sql, QueryGuardrails::default())
        {
            Ok(result) => {
                let rows = result
                    .rows
                    .first()
                    .and_then(|row| row.first())
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0);
                if rows > 0 {
                    check.detail(format!("'{}' answers with {rows} row(s)", catalog.table));
                } else {
                    check.issue(format!("'{}' is empty", catalog.table));
                }
            }
            Err(error) => check.issue(format!("'{}' is not queryable: {error}", catalog.table)),
        }
        Ok(check)
    }

    /// Parquet files below `prefix` as `(bucket-relative key, path)`, sorted by key.
    fn parquet_keys(&self, prefix: &str) -> Result<Vec<(String, PathBuf)>, WarehouseError> {
        let root = self.bucket_root.join(prefix);
        let mut files = Vec::new();
        if root.is_dir() {
            collect_parquet_files(&root, &mut files)?;
        }

        let mut keys: Vec<(String, PathBuf)> = files
            .into_iter()
            .filter_map(|path| {
                let key = path_to_sql(path.strip_prefix(&self.bucket_root).ok()?);
                Some((key, path))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Loads one file and checks its columns, row count and date columns.
fn inspect_file(
    inspector: &Connection,
    check: &mut LayoutCheck,
    key: &str,
    path: &Path,
    date: PartitionDate,
    required: &[&str],
) -> Result<(), WarehouseError> {
    let loaded = inspector.execute_batch(&format!(
        "CREATE OR REPLACE TABLE inspected AS SELECT * FROM read_parquet('{}', hive_partitioning = false)",
        escape_sql_string(&path_to_sql(path))
    ));
    if let Err(error) = loaded {
        check.issue(format!("'{key}' is unreadable: {error}"));
        return Ok(());
    }

    let mut statement =
        inspector.prepare("SELECT name FROM pragma_table_info('inspected') ORDER BY cid")?;
    let columns = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !columns.iter().any(|column| column == name))
        .collect();
    if !missing.is_empty() {
        check.issue(format!("'{key}' is missing columns: {}", missing.join(", ")));
        return Ok(());
    }

    let (rows, off_date): (i64, i64) = inspector.query_row(
        r#"
SELECT
    COUNT(*),
    COUNT(*) FILTER (
        WHERE CAST("year" AS INTEGER) <> ?
           OR CAST("month" AS INTEGER) <> ?
           OR CAST("day" AS INTEGER) <> ?
    )
FROM inspected
"#,
        params![date.year, i32::from(date.month), i32::from(date.day)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if rows == 0 {
        check.issue(format!("'{key}' has no rows"));
    } else if off_date > 0 {
        check.issue(format!("'{key}' has {off_date} row(s) outside {date}"));
    } else {
        check.detail(format!("'{key}' readable ({rows} row(s))"));
    }
    Ok(())
}

fn collect_parquet_files(root: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet_files(&path, files)?;
            continue;
        }
        if path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("parquet"))
        {
            files.push(path);
        }
    }
    Ok(())
}
