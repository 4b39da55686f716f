//! Tracing subscriber setup. Logs always go to stderr so stdout carries only
//! command results.

use std::env;
use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const JSON_ENV: &str = "LOG_JSON";

pub fn init(json_flag: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json_flag || json_from_env(env::var(JSON_ENV).ok().as_deref()) {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    if let Err(error) = result {
        eprintln!("warning: tracing already initialized: {error}");
    }
}

fn json_from_env(value: Option<&str>) -> bool {
    matches!(
        value.map(str::trim),
        Some(flag) if flag == "1" || flag.eq_ignore_ascii_case("true")
    )
}
