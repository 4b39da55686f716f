mod notify;
mod pipeline_test;
mod scrape;
mod sql;
mod transform;
mod validate;

use std::time::Instant;

use bovespa_core::PipelineConfig;
use bovespa_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, EnvelopeError, EnvelopeMeta};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }
}

pub async fn run(cli: &Cli, config: &PipelineConfig) -> Result<Envelope, CliError> {
    let started = Instant::now();

    let (name, command_result) = match &cli.command {
        Command::Scrape(args) => ("scrape", scrape::run(args, config).await?),
        Command::Transform(args) => ("transform", transform::run(args, config)?),
        Command::Notify(args) => ("notify", notify::run(args, config)?),
        Command::Sql(args) => ("sql", sql::run(args, config)?),
        Command::Validate(args) => ("validate", validate::run(args, config)?),
        Command::PipelineTest(args) => ("pipeline-test", pipeline_test::run(args, config)?),
    };

    let CommandResult {
        data,
        warnings,
        errors,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = EnvelopeMeta::new(name, latency_ms);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data, errors })
}

/// Opens the catalog warehouse under the configured home.
pub(crate) fn open_warehouse(config: &PipelineConfig) -> Result<Warehouse, CliError> {
    Warehouse::open(WarehouseConfig::from_pipeline(config)).map_err(|error| {
        CliError::Command(format!(
            "failed to open warehouse at '{}': {error}",
            config.warehouse_db_path().display()
        ))
    })
}
