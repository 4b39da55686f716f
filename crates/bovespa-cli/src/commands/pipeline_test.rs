//! End-to-end self test on built-in sample rows.
//!
//! Runs raw write and upload, a synthetic object-created notification, the
//! in-process transform, catalog registration, the summary queries and a
//! layout validation of the bucket inside a scratch home below
//! `--output-dir`, then writes `<output-dir>/logs/pipeline_report.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bovespa_core::{
    ConstituentRow, IngestNotifier, LocalObjectStore, NotificationBatch, PipelineConfig,
    UtcDateTime, ValidationError,
};
use bovespa_warehouse::{
    LayoutValidator, LocalTransformLauncher, QueryGuardrails, RawWriter, UploadTarget,
    WarehouseError,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::PipelineTestArgs;
use crate::error::CliError;
use crate::metadata::EnvelopeError;

use super::{open_warehouse, CommandResult};

const REPORT_FILE: &str = "pipeline_report.json";
const QUANTITY_TOLERANCE: f64 = 1e-6;

/// (code, name, class, theoretical quantity, weight percent)
const SAMPLE_ROWS: [(&str, &str, &str, f64, f64); 8] = [
    ("PETR4", "PETROBRAS", "PN N2", 4_500_000_000.0, 8.5),
    ("VALE3", "VALE", "ON N1", 5_200_000_000.0, 9.2),
    ("ITUB4", "ITAUUNIBANCO", "PN N1", 3_800_000_000.0, 7.1),
    ("BBDC4", "BRADESCO", "PN N1", 3_200_000_000.0, 6.3),
    ("ABEV3", "AMBEV S/A", "ON", 4_400_000_000.0, 2.7),
    ("B3SA3", "B3", "ON EJ NM", 5_200_000_000.0, 3.5),
    ("WEGE3", "WEG", "ON NM", 2_800_000_000.0, 4.8),
    ("RENT3", "LOCALIZA", "ON NM", 1_600_000_000.0, 2.1),
];

#[derive(Debug, Serialize)]
struct StepReport {
    name: &'static str,
    duration_ms: u64,
    detail: Value,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    name: &'static str,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct PipelineReport {
    started_at: UtcDateTime,
    finished_at: Option<UtcDateTime>,
    status: &'static str,
    error: Option<String>,
    steps: Vec<StepReport>,
    checks: Vec<CheckReport>,
}

impl PipelineReport {
    fn new(started_at: UtcDateTime) -> Self {
        Self {
            started_at,
            finished_at: None,
            status: "running",
            error: None,
            steps: Vec::new(),
            checks: Vec::new(),
        }
    }

    fn step(&mut self, name: &'static str, started: Instant, detail: Value) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(step = name, duration_ms, "pipeline step complete");
        self.steps.push(StepReport {
            name,
            duration_ms,
            detail,
        });
    }

    fn check(&mut self, name: &'static str, passed: bool, detail: String) {
        if passed {
            tracing::info!(check = name, %detail, "check passed");
        } else {
            tracing::error!(check = name, %detail, "check failed");
        }
        self.checks.push(CheckReport {
            name,
            passed,
            detail,
        });
    }

    fn failed_checks(&self) -> impl Iterator<Item = &CheckReport> {
        self.checks.iter().filter(|check| !check.passed)
    }

    fn finish(&mut self, error: Option<&CliError>) {
        self.finished_at = Some(UtcDateTime::now());
        self.error = error.map(ToString::to_string);
        self.status = if error.is_some() || self.failed_checks().next().is_some() {
            "failed"
        } else {
            "succeeded"
        };
    }
}

pub fn run(args: &PipelineTestArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let scoped = config.clone().with_home(args.output_dir.join("home"));
    let mut report = PipelineReport::new(UtcDateTime::now());

    let outcome = execute(args, &scoped, &mut report);
    report.finish(outcome.as_ref().err());
    let report_path = write_report(&args.output_dir, &report)?;
    tracing::info!(path = %report_path.display(), status = report.status, "pipeline report written");
    outcome?;

    let errors = report
        .failed_checks()
        .map(|check| EnvelopeError::new("check_failed", format!("{}: {}", check.name, check.detail)))
        .collect();

    let data = json!({
        "report_path": report_path,
        "report": report,
    });
    Ok(CommandResult::ok(data).with_errors(errors))
}

fn execute(
    args: &PipelineTestArgs,
    config: &PipelineConfig,
    report: &mut PipelineReport,
) -> Result<(), CliError> {
    let collected_at = report.started_at;
    let rows = sample_rows(collected_at)?;

    let started = Instant::now();
    let store = LocalObjectStore::new(config.storage_root.clone());
    let raw = RawWriter::new(config.raw_prefix.clone()).write(
        &rows,
        &args.output_dir.join("data"),
        Some(UploadTarget {
            store: &store,
            bucket: &args.bucket,
        }),
    )?;
    let uploaded = raw.uploaded.clone().ok_or_else(|| {
        CliError::Command(format!("raw upload failed: {}", raw.warnings.join("; ")))
    })?;
    report.step(
        "raw_partition",
        started,
        json!({
            "local_path": raw.local_path,
            "row_count": raw.row_count,
            "uploaded": uploaded,
        }),
    );

    let started = Instant::now();
    let warehouse = open_warehouse(config)?;
    let launcher = LocalTransformLauncher::new(store)
        .with_catalog(warehouse.clone(), &config.catalog_database, &config.catalog_table)
        .with_now(collected_at);
    let batch = NotificationBatch::object_created(&uploaded.bucket, &[uploaded.key.as_str()]);
    let outcome = IngestNotifier::from_config(config).handle(&batch, &launcher);
    if let Some(failed) = outcome.failed.first() {
        return Err(CliError::Command(format!("transform run failed: {}", failed.error)));
    }
    let reports = launcher.reports();
    let Some((run_id, transform)) = reports.first() else {
        return Err(CliError::Command(format!(
            "notification for '{}' started no transform run",
            uploaded.key
        )));
    };
    report.step(
        "notify_and_transform",
        started,
        json!({
            "outcome": outcome,
            "run_id": run_id,
            "groups": transform.records,
            "files": transform.files,
        }),
    );

    let started = Instant::now();
    let summaries = warehouse.run_summaries(&config.catalog_table, QueryGuardrails::default())?;
    report.step("summary_queries", started, serde_json::to_value(&summaries)?);

    let started = Instant::now();
    let bucket_root = LocalObjectStore::new(config.storage_root.clone())
        .bucket_root(&args.bucket)
        .map_err(WarehouseError::from)?;
    let layout = LayoutValidator::new(bucket_root)
        .with_prefixes(&config.raw_prefix, &config.refined_prefix)
        .with_catalog(&warehouse, &config.catalog_database, &config.catalog_table)
        .validate()?;
    report.step("layout_validation", started, serde_json::to_value(&layout)?);

    let raw_quantity: f64 = rows.iter().map(|row| row.theoretical_quantity).sum();
    let refined_quantity: f64 = transform
        .records
        .iter()
        .map(|record| record.total_theoretical_quantity)
        .sum();
    report.check(
        "quantity_preserved",
        (raw_quantity - refined_quantity).abs() <= raw_quantity.abs() * QUANTITY_TOLERANCE,
        format!("raw={raw_quantity} refined={refined_quantity}"),
    );

    let counted: i64 = transform.records.iter().map(|record| record.count_in_class).sum();
    report.check(
        "row_count_preserved",
        usize::try_from(counted).is_ok_and(|counted| counted == rows.len()),
        format!("raw={} refined={counted}", rows.len()),
    );

    let missing = transform.files.iter().filter(|file| !file.is_file()).count();
    report.check(
        "one_file_per_group",
        missing == 0 && transform.files.len() == transform.records.len(),
        format!(
            "groups={} files={} missing={missing}",
            transform.records.len(),
            transform.files.len()
        ),
    );

    let issues: Vec<String> = layout
        .failed_checks()
        .flat_map(|check| check.issues.iter().map(move |issue| format!("{}: {issue}", check.name)))
        .collect();
    report.check(
        "layout_valid",
        layout.passed(),
        if issues.is_empty() {
            format!("{} checks passed", layout.checks.len())
        } else {
            issues.join("; ")
        },
    );

    Ok(())
}

fn sample_rows(collected_at: UtcDateTime) -> Result<Vec<ConstituentRow>, ValidationError> {
    let trade_date = collected_at.date();
    SAMPLE_ROWS
        .iter()
        .map(|(code, name, class, quantity, weight)| {
            ConstituentRow::new(*code, *name, *class, *quantity, *weight, trade_date, collected_at)
        })
        .collect()
}

fn write_report(output_dir: &Path, report: &PipelineReport) -> Result<PathBuf, CliError> {
    let logs = output_dir.join("logs");
    fs::create_dir_all(&logs)?;
    let path = logs.join(REPORT_FILE);
    fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rows_cover_six_classes() {
        let rows = sample_rows(UtcDateTime::now()).expect("valid samples");
        let mut classes: Vec<&str> = rows.iter().map(|row| row.class.as_str()).collect();
        classes.sort_unstable();
        classes.dedup();
        assert_eq!(rows.len(), 8);
        assert_eq!(classes.len(), 6);
    }

    #[test]
    fn self_test_writes_a_passing_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let args = PipelineTestArgs {
            output_dir: temp.path().join("run"),
            bucket: String::from("bovespa-pipeline-test"),
        };
        let config = PipelineConfig::default().with_home(temp.path().join("unused"));

        let result = run(&args, &config).expect("pipeline test succeeds");
        assert!(result.errors.is_empty());

        let written = fs::read_to_string(args.output_dir.join("logs").join(REPORT_FILE))
            .expect("report written");
        let parsed: Value = serde_json::from_str(&written).expect("report is json");
        assert_eq!(parsed["status"], "succeeded");
        assert_eq!(parsed["checks"].as_array().map(Vec::len), Some(4));
        assert_eq!(parsed["steps"].as_array().map(Vec::len), Some(4));
    }
}
