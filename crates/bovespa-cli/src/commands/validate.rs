use std::fs;

use bovespa_core::{LocalObjectStore, PipelineConfig};
use bovespa_warehouse::{LayoutValidator, WarehouseError};

use crate::cli::ValidateArgs;
use crate::error::CliError;
use crate::metadata::EnvelopeError;

use super::{open_warehouse, CommandResult};

pub fn run(args: &ValidateArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let bucket_root = LocalObjectStore::new(config.storage_root.clone())
        .bucket_root(&args.bucket)
        .map_err(WarehouseError::from)?;
    let warehouse = open_warehouse(config)?;

    let report = LayoutValidator::new(bucket_root)
        .with_prefixes(&config.raw_prefix, &config.refined_prefix)
        .with_catalog(&warehouse, &config.catalog_database, &config.catalog_table)
        .validate()?;

    if let Some(path) = &args.report {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "validation report written");
    }

    let errors = report
        .failed_checks()
        .flat_map(|check| {
            check.issues.iter().map(move |issue| {
                EnvelopeError::new("validation_failed", format!("{}: {issue}", check.name))
            })
        })
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_errors(errors))
}
