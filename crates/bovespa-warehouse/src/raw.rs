//! Raw partition writer.
//!
//! Rows are staged in an in-memory DuckDB table and copied out as a single
//! parquet file carrying the row columns plus `year`, `month` and `day`.

use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection};
use bovespa_core::domain::{raw_file_name, raw_object_key};
use bovespa_core::{ConstituentRow, ObjectLocation, ObjectStore, PartitionDate};
use serde::Serialize;

use crate::{escape_sql_string, path_to_sql, WarehouseError};

const CREATE_RAW_TABLE: &str = r#"
CREATE TABLE raw_rows (
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    class TEXT NOT NULL,
    theoretical_quantity DOUBLE NOT NULL,
    weight_percent DOUBLE NOT NULL,
    trade_date DATE NOT NULL,
    collected_at TIMESTAMP NOT NULL,
    "year" INTEGER NOT NULL,
    "month" INTEGER NOT NULL,
    "day" INTEGER NOT NULL
);
"#;

/// Where to upload the raw file after the local write.
#[derive(Clone, Copy)]
pub struct UploadTarget<'a> {
    pub store: &'a dyn ObjectStore,
    pub bucket: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawWriteReport {
    pub local_path: PathBuf,
    pub partition: PartitionDate,
    pub row_count: usize,
    pub uploaded: Option<ObjectLocation>,
    /// Upload problems; the local file is still valid.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RawWriter {
    raw_prefix: String,
}

impl Default for RawWriter {
    fn default() -> Self {
        Self::new("raw-data/")
    }
}

impl RawWriter {
    pub fn new(raw_prefix: impl Into<String>) -> Self {
        Self {
            raw_prefix: raw_prefix.into(),
        }
    }

    /// Writes `rows` to `<output_dir>/ibov_portfolio_YYYYMMDD.parquet` and
    /// optionally uploads it under the date-partitioned raw key.
    ///
    /// The partition date is the trade date of the first row.
    pub fn write(
        &self,
        rows: &[ConstituentRow],
        output_dir: &Path,
        upload: Option<UploadTarget<'_>>,
    ) -> Result<RawWriteReport, WarehouseError> {
        let first = rows.first().ok_or(WarehouseError::EmptySnapshot)?;
        let partition = PartitionDate::from_date(first.trade_date);

        fs::create_dir_all(output_dir)?;
        let file_name = raw_file_name(partition);
        let local_path = output_dir.join(&file_name);

        write_parquet(rows, &local_path)?;
        tracing::info!(
            path = %local_path.display(),
            rows = rows.len(),
            partition = %partition,
            "raw partition written"
        );

        let mut report = RawWriteReport {
            local_path,
            partition,
            row_count: rows.len(),
            uploaded: None,
            warnings: Vec::new(),
        };

        if let Some(target) = upload {
            let key = raw_object_key(&self.raw_prefix, partition, &file_name);
            match target.store.put_file(target.bucket, &key, &report.local_path) {
                Ok(location) => {
                    tracing::info!(%location, "raw partition uploaded");
                    report.uploaded = Some(location);
                }
                Err(error) => {
                    tracing::warn!(bucket = target.bucket, key = %key, %error, "raw partition upload failed");
                    report.warnings.push(format!(
                        "upload to bucket '{}' failed: {error}",
                        target.bucket
                    ));
                }
            }
        }

        Ok(report)
    }
}

fn write_parquet(rows: &[ConstituentRow], path: &Path) -> Result<(), WarehouseError> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch("PRAGMA disable_progress_bar; SET threads TO 1;")?;
    connection.execute_batch(CREATE_RAW_TABLE)?;

    {
        let mut insert = connection.prepare(
            r#"
INSERT INTO raw_rows VALUES (
    ?, ?, ?, ?, ?, CAST(? AS DATE), CAST(? AS TIMESTAMP), ?, ?, ?
)
"#,
        )?;
        for row in rows {
            let partition = PartitionDate::from_date(row.trade_date);
            insert.execute(params![
                row.code,
                row.name,
                row.class,
                row.theoretical_quantity,
                row.weight_percent,
                row.trade_date_iso(),
                row.collected_at.format_sql(),
                partition.year,
                i32::from(partition.month),
                i32::from(partition.day),
            ])?;
        }
    }

    connection.execute_batch(&format!(
        "COPY (SELECT * FROM raw_rows ORDER BY code) TO '{}' (FORMAT PARQUET)",
        escape_sql_string(&path_to_sql(path))
    ))?;
    Ok(())
}
