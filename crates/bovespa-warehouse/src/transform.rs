//! # Transformer
//!
//! Deterministic pipeline over one raw partition:
//!
//! 1. rename `theoretical_quantity` and `weight_percent`
//! 2. derive `days_since_collection` against a caller-supplied `now`
//! 3. aggregate by (`class`, `year`, `month`, `day`)
//! 4. write every group as its own `part-00000.parquet` below
//!    `year=/month=/day=/class=<sanitized>/`
//!
//! A rerun replaces the whole `year=/month=/day=` directory of every date it
//! writes, so classes missing from the new snapshot disappear.
//!
//! Each run uses a private single-threaded in-memory DuckDB, so equal input
//! and equal `now` give byte-identical files.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection};
use bovespa_core::domain::{refined_date_prefix, refined_object_key};
use bovespa_core::{PartitionDate, UtcDateTime};
use serde::Serialize;

use crate::{escape_sql_string, path_to_sql, WarehouseError};

/// Columns a raw partition must provide.
pub(crate) const REQUIRED_COLUMNS: [&str; 8] = [
    "code",
    "class",
    "theoretical_quantity",
    "weight_percent",
    "collected_at",
    "year",
    "month",
    "day",
];

/// Column renames applied before aggregation.
pub const COLUMN_RENAMES: [(&str, &str); 2] = [
    ("theoretical_quantity", "theoretical_share_quantity"),
    ("weight_percent", "index_weight_percentage"),
];

/// One aggregated group of a refined partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedRecord {
    pub class: String,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub total_theoretical_quantity: f64,
    pub average_weight_percent: f64,
    pub count_in_class: i64,
}

impl RefinedRecord {
    pub fn partition(&self) -> Result<PartitionDate, WarehouseError> {
        let invalid = || {
            WarehouseError::Data(format!(
                "group has an invalid date: {}-{}-{}",
                self.year, self.month, self.day
            ))
        };
        let partition = PartitionDate {
            year: self.year,
            month: u8::try_from(self.month).map_err(|_| invalid())?,
            day: u8::try_from(self.day).map_err(|_| invalid())?,
        };
        partition.to_date().map_err(|_| invalid())?;
        Ok(partition)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub input_path: PathBuf,
    pub output_root: PathBuf,
    pub rows_read: usize,
    pub min_days_since_collection: Option<i64>,
    pub max_days_since_collection: Option<i64>,
    pub records: Vec<RefinedRecord>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    refined_prefix: String,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new("refined-data/")
    }
}

impl Transformer {
    pub fn new(refined_prefix: impl Into<String>) -> Self {
        Self {
            refined_prefix: refined_prefix.into(),
        }
    }

    pub fn refined_prefix(&self) -> &str {
        &self.refined_prefix
    }

    /// Runs all four steps over `raw_path`, writing below `output_root`.
    ///
    /// # Errors
    /// [`WarehouseError::Data`] when the input is missing, unreadable, lacks
    /// required columns or has no rows; nothing is written in that case.
    pub fn transform(
        &self,
        raw_path: &Path,
        output_root: &Path,
        now: UtcDateTime,
    ) -> Result<TransformReport, WarehouseError> {
        let staged = StagedPartition::load(raw_path)?;
        let rows_read = staged.row_count()?;

        staged.rename_columns()?;
        let (min_days, max_days) = staged.derive_days_since_collection(now)?;
        let records = staged.aggregate()?;
        let files = staged.write_groups(output_root, &self.refined_prefix, &records)?;

        tracing::info!(
            input = %raw_path.display(),
            rows = rows_read,
            groups = records.len(),
            "refined partition written"
        );

        Ok(TransformReport {
            input_path: raw_path.to_path_buf(),
            output_root: output_root.to_path_buf(),
            rows_read,
            min_days_since_collection: min_days,
            max_days_since_collection: max_days,
            records,
            files,
        })
    }
}

/// A raw partition loaded into a private in-memory table named `staged`.
pub struct StagedPartition {
    connection: Connection,
}

impl StagedPartition {
    pub fn load(raw_path: &Path) -> Result<Self, WarehouseError> {
        if !raw_path.is_file() {
            return Err(WarehouseError::Data(format!(
                "raw partition '{}' does not exist",
                raw_path.display()
            )));
        }

        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA disable_progress_bar; SET threads TO 1;")?;
        connection
            .execute_batch(&format!(
                "CREATE TABLE staged AS SELECT * FROM read_parquet('{}', hive_partitioning = false)",
                escape_sql_string(&path_to_sql(raw_path))
            ))
            .map_err(|error| {
                WarehouseError::Data(format!(
                    "raw partition '{}' is unreadable: {error}",
                    raw_path.display()
                ))
            })?;

        let staged = Self { connection };
        let columns = staged.columns()?;
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|column| column == required))
            .collect();
        if !missing.is_empty() {
            return Err(WarehouseError::Data(format!(
                "raw partition '{}' is missing columns: {}",
                raw_path.display(),
                missing.join(", ")
            )));
        }

        if staged.row_count()? == 0 {
            return Err(WarehouseError::Data(format!(
                "raw partition '{}' has no rows",
                raw_path.display()
            )));
        }

        Ok(staged)
    }

    pub fn columns(&self) -> Result<Vec<String>, WarehouseError> {
        let mut statement = self
            .connection
            .prepare("SELECT name FROM pragma_table_info('staged') ORDER BY cid")?;
        let columns = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    pub fn row_count(&self) -> Result<usize, WarehouseError> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM staged", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Sorted values of a numeric column, for inspecting the staged data.
    pub fn double_values(&self, column: &str) -> Result<Vec<f64>, WarehouseError> {
        bovespa_core::catalog::validate_identifier(column)?;
        let mut statement = self.connection.prepare(&format!(
            "SELECT CAST(\"{column}\" AS DOUBLE) FROM staged ORDER BY 1"
        ))?;
        let values = statement
            .query_map([], |row| row.get::<_, f64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    pub fn rename_columns(&self) -> Result<(), WarehouseError> {
        for (from, to) in COLUMN_RENAMES {
            self.connection.execute_batch(&format!(
                "ALTER TABLE staged RENAME COLUMN \"{from}\" TO \"{to}\""
            ))?;
        }
        Ok(())
    }

    /// Adds `days_since_collection`, the floor of whole days from
    /// `collected_at` to `now`. Returns the min and max derived value.
    pub fn derive_days_since_collection(
        &self,
        now: UtcDateTime,
    ) -> Result<(Option<i64>, Option<i64>), WarehouseError> {
        self.connection.execute_batch(
            r#"
ALTER TABLE staged ADD COLUMN days_since_collection BIGINT;
CREATE OR REPLACE TABLE collection_days (collected_us BIGINT, days BIGINT);
"#,
        )?;

        let mut distinct = self.connection.prepare(
            r#"
SELECT DISTINCT epoch_us(CAST(collected_at AS TIMESTAMP))
FROM staged
WHERE collected_at IS NOT NULL
ORDER BY 1
"#,
        )?;
        let instants = distinct
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut insert = self
            .connection
            .prepare("INSERT INTO collection_days VALUES (?, ?)")?;
        for micros in instants {
            let collected_at = UtcDateTime::from_unix_micros(micros)?;
            insert.execute(params![micros, now.whole_days_since(collected_at)])?;
        }
        drop(insert);
        drop(distinct);

        self.connection.execute_batch(
            r#"
UPDATE staged
SET days_since_collection = collection_days.days
FROM collection_days
WHERE epoch_us(CAST(staged.collected_at AS TIMESTAMP)) = collection_days.collected_us;
DROP TABLE collection_days;
"#,
        )?;

        let range = self.connection.query_row(
            "SELECT MIN(days_since_collection), MAX(days_since_collection) FROM staged",
            [],
            |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
        )?;
        Ok(range)
    }

    /// Builds the `refined` table, one row per group, ordered by date then class.
    pub fn aggregate(&self) -> Result<Vec<RefinedRecord>, WarehouseError> {
        self.connection.execute_batch(
            r#"
CREATE OR REPLACE TABLE refined AS
SELECT
    row_number() OVER (ORDER BY "year", "month", "day", "class") AS group_index,
    "class",
    "year",
    "month",
    "day",
    total_theoretical_quantity,
    average_weight_percent,
    count_in_class
FROM (
    SELECT
        CAST("class" AS VARCHAR) AS "class",
        CAST("year" AS INTEGER) AS "year",
        CAST("month" AS INTEGER) AS "month",
        CAST("day" AS INTEGER) AS "day",
        CAST(SUM(theoretical_share_quantity) AS DOUBLE) AS total_theoretical_quantity,
        CAST(AVG(index_weight_percentage) AS DOUBLE) AS average_weight_percent,
        CAST(COUNT(*) AS BIGINT) AS count_in_class
    FROM staged
    GROUP BY "class", "year", "month", "day"
) grouped;
"#,
        )?;

        let mut statement = self.connection.prepare(
            r#"
SELECT "class", "year", "month", "day",
       total_theoretical_quantity, average_weight_percent, count_in_class
FROM refined
ORDER BY group_index
"#,
        )?;
        let records = statement
            .query_map([], |row| {
                Ok(RefinedRecord {
                    class: row.get(0)?,
                    year: row.get(1)?,
                    month: row.get(2)?,
                    day: row.get(3)?,
                    total_theoretical_quantity: row.get(4)?,
                    average_weight_percent: row.get(5)?,
                    count_in_class: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Writes each group to its own single-row file, replacing any earlier
    /// output for the same dates. Stops at the first failure.
    ///
    /// # Errors
    /// [`WarehouseError::Data`] before anything is touched on disk when a group
    /// has an invalid date or two classes sanitize to the same path.
    pub fn write_groups(
        &self,
        output_root: &Path,
        refined_prefix: &str,
        records: &[RefinedRecord],
    ) -> Result<Vec<PathBuf>, WarehouseError> {
        let files = plan_group_files(output_root, refined_prefix, records)?;

        let dates: BTreeSet<_> = records
            .iter()
            .map(RefinedRecord::partition)
            .collect::<Result<_, _>>()?;
        for date in dates {
            let directory = output_root.join(refined_date_prefix(refined_prefix, date));
            if directory.is_dir() {
                fs::remove_dir_all(&directory)?;
                tracing::debug!(path = %directory.display(), "previous refined output removed");
            }
        }

        for (index, (record, path)) in records.iter().zip(&files).enumerate() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            self.connection.execute_batch(&format!(
                r#"
COPY (
    SELECT * EXCLUDE (group_index) FROM refined WHERE group_index = {group}
) TO '{path}' (FORMAT PARQUET)
"#,
                group = index + 1,
                path = escape_sql_string(&path_to_sql(path)),
            ))?;
            tracing::debug!(class = %record.class, path = %path.display(), "refined group written");
        }
        Ok(files)
    }
}

/// Target file of every group, in record order.
fn plan_group_files(
    output_root: &Path,
    refined_prefix: &str,
    records: &[RefinedRecord],
) -> Result<Vec<PathBuf>, WarehouseError> {
    let mut claimed: BTreeMap<PathBuf, &str> = BTreeMap::new();
    let mut files = Vec::with_capacity(records.len());
    for record in records {
        let partition = record.partition()?;
        let path = output_root.join(refined_object_key(refined_prefix, partition, &record.class));
        if let Some(previous) = claimed.insert(path.clone(), record.class.as_str()) {
            return Err(WarehouseError::Data(format!(
                "classes '{previous}' and '{}' both map to '{}'",
                record.class,
                path.display()
            )));
        }
        files.push(path);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_a_data_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = Transformer::default()
            .transform(
                &temp.path().join("absent.parquet"),
                temp.path(),
                UtcDateTime::now(),
            )
            .expect_err("missing file");
        assert!(matches!(error, WarehouseError::Data(_)));
    }

    #[test]
    fn input_without_required_columns_is_a_data_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("wrong.parquet");
        let connection = Connection::open_in_memory().expect("db");
        connection
            .execute_batch(&format!(
                "COPY (SELECT 'PETR4' AS code) TO '{}' (FORMAT PARQUET)",
                escape_sql_string(&path_to_sql(&path))
            ))
            .expect("write parquet");

        let error = StagedPartition::load(&path).err().expect("missing columns");
        match error {
            WarehouseError::Data(message) => assert!(message.contains("weight_percent")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn record_partition_rejects_impossible_dates() {
        let record = RefinedRecord {
            class: String::from("ON"),
            year: 2026,
            month: 13,
            day: 1,
            total_theoretical_quantity: 1.0,
            average_weight_percent: 1.0,
            count_in_class: 1,
        };
        assert!(record.partition().is_err());
    }

    fn record(class: &str, day: i32) -> RefinedRecord {
        RefinedRecord {
            class: class.to_owned(),
            year: 2026,
            month: 10,
            day,
            total_theoretical_quantity: 1.0,
            average_weight_percent: 1.0,
            count_in_class: 1,
        }
    }

    #[test]
    fn colliding_class_paths_are_rejected_before_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let records = [record("ON NM", 16), record("ON/NM", 16)];

        let error = plan_group_files(temp.path(), "refined-data/", &records).expect_err("collision");

        match error {
            WarehouseError::Data(message) => {
                assert!(message.contains("ON NM") && message.contains("ON/NM"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_date_in_a_later_group_fails_the_whole_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let records = [record("ON", 16), record("PN", 32)];

        let error = plan_group_files(temp.path(), "refined-data/", &records).expect_err("bad date");

        assert!(matches!(error, WarehouseError::Data(_)));
        assert!(!temp.path().join("refined-data").exists());
    }

    #[test]
    fn plan_keeps_record_order() {
        let root = Path::new("/out");
        let files = plan_group_files(root, "refined-data/", &[record("PN", 16), record("ON", 17)])
            .expect("valid plan");
        assert_eq!(
            files,
            [
                root.join("refined-data/year=2026/month=10/day=16/class=PN/part-00000.parquet"),
                root.join("refined-data/year=2026/month=10/day=17/class=ON/part-00000.parquet"),
            ]
        );
    }
}
