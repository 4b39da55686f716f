//! Pipeline configuration shared by every stage.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fetcher::DEFAULT_SNAPSHOT_URL;
use crate::http_client::DEFAULT_TIMEOUT_MS;

/// Environment variable overriding the pipeline home directory.
pub const HOME_ENV: &str = "BOVESPA_HOME";

const STORAGE_DIR: &str = "storage";

/// Settings for one pipeline process.
///
/// Every field has a default so partial config files and environment
/// overlays deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub home: PathBuf,
    pub source_url: String,
    pub request_timeout_ms: u64,
    pub raw_prefix: String,
    pub refined_prefix: String,
    pub raw_file_suffix: String,
    /// Directory backing the local object store; one subdirectory per bucket.
    pub storage_root: PathBuf,
    pub job_name: String,
    pub catalog_database: String,
    pub catalog_table: String,
    pub enable_metrics: bool,
    pub continuous_logging: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let home = resolve_home();
        Self {
            storage_root: home.join(STORAGE_DIR),
            home,
            source_url: String::from(DEFAULT_SNAPSHOT_URL),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            raw_prefix: String::from("raw-data/"),
            refined_prefix: String::from("refined-data/"),
            raw_file_suffix: String::from(".parquet"),
            job_name: String::from("bovespa-etl-job"),
            catalog_database: String::from("bovespa_database"),
            catalog_table: String::from("bovespa_refined_data"),
            enable_metrics: true,
            continuous_logging: true,
        }
    }
}

impl PipelineConfig {
    /// DuckDB file holding the local catalog and run audit.
    pub fn warehouse_db_path(&self) -> PathBuf {
        self.home.join("catalog").join("warehouse.duckdb")
    }

    /// Storage root implied by `home` when none is configured.
    pub fn home_storage_root(&self) -> PathBuf {
        self.home.join(STORAGE_DIR)
    }

    /// Re-roots the home directory and the storage root under `home`.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self.storage_root = self.home_storage_root();
        self
    }
}

/// `BOVESPA_HOME`, else `$HOME/.bovespa`, else `.bovespa` in the working directory.
pub fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }

    match env::var_os("HOME").filter(|value| !value.is_empty()) {
        Some(home) => PathBuf::from(home).join(".bovespa"),
        None => PathBuf::from(".bovespa"),
    }
}
