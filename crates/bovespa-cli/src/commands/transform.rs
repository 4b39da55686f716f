use bovespa_core::domain::normalize_prefix;
use bovespa_core::{PipelineConfig, UtcDateTime};
use bovespa_warehouse::Transformer;
use serde_json::json;

use crate::cli::TransformArgs;
use crate::error::CliError;

use super::{open_warehouse, CommandResult};

pub fn run(args: &TransformArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let now = match args.now.as_deref() {
        Some(raw) => UtcDateTime::parse(raw)?,
        None => UtcDateTime::now(),
    };
    let prefix = args.prefix.as_deref().unwrap_or(&config.refined_prefix);

    let report = Transformer::new(prefix).transform(&args.input, &args.output_root, now)?;

    let registered = if args.register {
        let warehouse = open_warehouse(config)?;
        let location = args.output_root.join(normalize_prefix(prefix));
        let registration = warehouse.register_refined(
            &config.catalog_database,
            &config.catalog_table,
            &location,
        )?;
        Some(format!("{}.{}", registration.database, registration.table))
    } else {
        None
    };

    let data = json!({
        "report": report,
        "now": now,
        "registered": registered,
    });
    Ok(CommandResult::ok(data))
}
