//! Layered configuration: defaults, then `config/default.toml` if present,
//! then `BOVESPA__*` environment variables, then the `--home` flag.
//!
//! `storage_root` follows `home` unless a layer sets it explicitly.

use std::path::Path;

use config::builder::DefaultState;
use config::ConfigBuilder;

use bovespa_core::PipelineConfig;

use crate::error::CliError;

const CONFIG_FILE: &str = "config/default";
const ENV_PREFIX: &str = "BOVESPA";

pub fn load(home: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let defaults = PipelineConfig::default();
    let builder = config::Config::builder()
        .add_source(config::Config::try_from(&defaults)?)
        .add_source(
            config::File::with_name(CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
    resolve(builder, &defaults, home)
}

fn resolve(
    builder: ConfigBuilder<DefaultState>,
    defaults: &PipelineConfig,
    home: Option<&Path>,
) -> Result<PipelineConfig, CliError> {
    let mut pipeline: PipelineConfig = builder.build()?.try_deserialize()?;
    if pipeline.storage_root == defaults.storage_root {
        pipeline.storage_root = pipeline.home_storage_root();
    }
    if let Some(home) = home {
        pipeline = pipeline.with_home(home);
    }
    Ok(pipeline)
}
