use bovespa_core::PipelineConfig;
use bovespa_warehouse::QueryGuardrails;

use crate::cli::SqlArgs;
use crate::error::CliError;

use super::{open_warehouse, CommandResult};

pub fn run(args: &SqlArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Command(String::from("query must not be empty")));
    }

    let warehouse = open_warehouse(config)?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };

    let result = warehouse
        .execute_query(query, guardrails)
        .map_err(|error| CliError::Command(format!("query execution failed: {error}")))?;

    let truncated = result.truncated;
    let row_count = result.row_count;
    let mut command_result = CommandResult::ok(serde_json::to_value(&result)?);

    if truncated {
        command_result = command_result.with_warning(format!(
            "result truncated at {row_count} rows (use --max-rows to increase limit)"
        ));
    }

    Ok(command_result)
}
