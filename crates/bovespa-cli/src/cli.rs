//! CLI argument definitions for the bovespa pipeline.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scrape` | Fetch the IBOV portfolio and write the raw partition |
//! | `transform` | Refine one raw partition into per-class files |
//! | `notify` | Handle a storage notification and launch transform runs |
//! | `sql` | Query the local DuckDB catalog |
//! | `validate` | Check the raw, refined and catalog layout of a bucket |
//! | `pipeline-test` | Run the whole pipeline on sample data |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--log-json` | `false` | JSON log lines on stderr |
//! | `--home` | `$BOVESPA_HOME` | Pipeline home directory |
//!
//! # Examples
//!
//! ```bash
//! bovespa scrape --output-dir data --bucket bovespa
//! bovespa transform data/ibov_portfolio_20261016.parquet --output-root out
//! bovespa notify event.json
//! bovespa sql "SELECT * FROM bovespa_refined_data"
//! bovespa validate --bucket bovespa --report logs/validation_report.json
//! bovespa pipeline-test --output-dir pipeline-test --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Batch pipeline for the B3 IBOV index portfolio.
#[derive(Debug, Parser)]
#[command(
    name = "bovespa",
    author,
    version,
    about = "Batch pipeline for the B3 IBOV index portfolio",
    long_about = "Scrapes the daily IBOV theoretical portfolio, stores it as a date-partitioned \
raw parquet file, and refines it into per-class aggregates queryable through a local DuckDB \
catalog.\n\
\n\
Use 'bovespa <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    ///
    /// A scrape that falls back to placeholder rows always warns, so this
    /// flag turns it into a failure.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Emit log lines as JSON. `LOG_JSON=1` has the same effect.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    /// Pipeline home directory; overrides `BOVESPA_HOME` and config files.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text summary for terminal display.
    Table,
    /// Single JSON object output.
    Json,
    /// Newline-delimited JSON (one object per line).
    Ndjson,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the IBOV portfolio and write today's raw partition.
    ///
    /// # Examples
    ///
    ///   bovespa scrape --output-dir data
    ///   bovespa scrape --output-dir data --bucket bovespa
    Scrape(ScrapeArgs),

    /// Refine one raw partition into per-class parquet files.
    ///
    /// # Examples
    ///
    ///   bovespa transform data/ibov_portfolio_20261016.parquet --output-root out
    ///   bovespa transform raw.parquet --output-root out --now 2026-10-17T00:00:00Z
    Transform(TransformArgs),

    /// Handle a storage notification (S3 event JSON) and launch transform runs.
    ///
    /// # Examples
    ///
    ///   bovespa notify event.json
    Notify(NotifyArgs),

    /// Run SQL queries against the local catalog.
    ///
    /// # Examples
    ///
    ///   bovespa sql "SELECT * FROM bovespa_refined_data"
    ///   bovespa sql "SELECT * FROM transform_runs" --max-rows 20
    Sql(SqlArgs),

    /// Check raw and refined partition layout plus the catalog entry of a bucket.
    ///
    /// # Examples
    ///
    ///   bovespa validate --bucket bovespa
    ///   bovespa validate --bucket bovespa --report logs/validation_report.json
    Validate(ValidateArgs),

    /// Run scrape-to-query on sample rows and write an execution report.
    ///
    /// # Examples
    ///
    ///   bovespa pipeline-test --output-dir pipeline-test
    PipelineTest(PipelineTestArgs),
}

/// Arguments for the `scrape` command.
#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Directory receiving `ibov_portfolio_YYYYMMDD.parquet`.
    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,

    /// Upload the raw file to this bucket of the local object store.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Portfolio page URL; overrides `source_url` from configuration.
    #[arg(long)]
    pub url: Option<String>,

    /// Request timeout in milliseconds; overrides `request_timeout_ms`.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Arguments for the `transform` command.
#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Raw partition parquet file.
    pub input: PathBuf,

    /// Directory that receives the refined prefix.
    #[arg(long)]
    pub output_root: PathBuf,

    /// Refined key prefix; overrides `refined_prefix`.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Reference instant for `days_since_collection` (RFC 3339, UTC).
    #[arg(long)]
    pub now: Option<String>,

    /// Register the refined output in the local catalog.
    #[arg(long, default_value_t = false)]
    pub register: bool,
}

/// Arguments for the `notify` command.
#[derive(Debug, Args)]
pub struct NotifyArgs {
    /// Notification JSON file, or `-` for stdin.
    pub event: PathBuf,
}

/// Arguments for the `validate` command.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Bucket of the local object store to inspect.
    #[arg(long)]
    pub bucket: String,

    /// Also write the validation report as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Arguments for the `sql` command.
#[derive(Debug, Args)]
pub struct SqlArgs {
    /// Read-only SQL query (SELECT or CTE) to execute.
    pub query: String,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Query timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}

/// Arguments for the `pipeline-test` command.
#[derive(Debug, Args)]
pub struct PipelineTestArgs {
    /// Scratch directory for data, storage, catalog and `logs/pipeline_report.json`.
    #[arg(long, default_value = "pipeline-test")]
    pub output_dir: PathBuf,

    /// Bucket name used inside the scratch object store.
    #[arg(long, default_value = "bovespa-pipeline-test")]
    pub bucket: String,
}
