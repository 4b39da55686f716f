use std::fs;
use std::io;
use std::path::Path;

use bovespa_core::{IngestNotifier, LocalObjectStore, NotificationBatch, PipelineConfig};
use bovespa_warehouse::LocalTransformLauncher;
use serde_json::json;

use crate::cli::NotifyArgs;
use crate::error::CliError;
use crate::metadata::EnvelopeError;

use super::{open_warehouse, CommandResult};

pub fn run(args: &NotifyArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let payload = read_event(&args.event)?;
    let batch = NotificationBatch::from_json(&payload)?;

    let warehouse = open_warehouse(config)?;
    let launcher = LocalTransformLauncher::new(LocalObjectStore::new(config.storage_root.clone()))
        .with_catalog(warehouse, &config.catalog_database, &config.catalog_table);

    let notifier = IngestNotifier::from_config(config);
    let outcome = notifier.handle(&batch, &launcher);
    tracing::info!(
        records = outcome.records_seen,
        runs = outcome.job_runs.len(),
        skipped = outcome.skipped.len(),
        failed = outcome.failed.len(),
        "notification handled"
    );

    let mut warnings = Vec::new();
    if outcome.is_empty_batch() {
        warnings.push(String::from("notification batch has no records"));
    }
    warnings.extend(
        outcome
            .skipped
            .iter()
            .map(|skipped| format!("record {} skipped: {}", skipped.index, skipped.reason)),
    );

    let errors = outcome
        .failed
        .iter()
        .map(|failed| {
            EnvelopeError::new(
                "launch_failed",
                format!("{}/{}: {}", failed.bucket, failed.object_key, failed.error),
            )
        })
        .collect();

    let runs: Vec<_> = launcher
        .reports()
        .into_iter()
        .map(|(run_id, report)| {
            json!({
                "run_id": run_id,
                "rows_read": report.rows_read,
                "groups_written": report.files.len(),
                "files": report.files,
            })
        })
        .collect();

    let data = json!({
        "job_name": notifier.job_name(),
        "outcome": outcome,
        "runs": runs,
    });
    Ok(CommandResult::ok(data)
        .with_warnings(warnings)
        .with_errors(errors))
}

fn read_event(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        return Ok(io::read_to_string(io::stdin())?);
    }
    fs::read_to_string(path).map_err(|error| {
        CliError::Command(format!(
            "failed to read notification '{}': {error}",
            path.display()
        ))
    })
}
