use std::sync::Arc;

use bovespa_core::{
    IndexSnapshotFetcher, LocalObjectStore, PipelineConfig, ReqwestHttpClient, UtcDateTime,
};
use bovespa_warehouse::{RawWriter, UploadTarget};
use serde_json::json;

use crate::cli::ScrapeArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &ScrapeArgs, config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let url = args.url.as_deref().unwrap_or(&config.source_url);
    let timeout_ms = args.timeout_ms.unwrap_or(config.request_timeout_ms);

    let fetcher = IndexSnapshotFetcher::new(Arc::new(ReqwestHttpClient::new()))
        .with_url(url)
        .with_timeout_ms(timeout_ms);

    tracing::info!(url, timeout_ms, "fetching index portfolio");
    let snapshot = fetcher.fetch(UtcDateTime::now()).await?;

    let mut warnings = Vec::new();
    for skipped in &snapshot.skipped {
        tracing::warn!(row = skipped.row, code = ?skipped.code, reason = %skipped.reason, "row skipped");
        warnings.push(format!("skipped {skipped}"));
    }
    if snapshot.is_fallback() {
        tracing::warn!(
            rows = snapshot.rows.len(),
            "no portfolio data found on the page; placeholder rows used"
        );
        warnings.push(String::from(
            "portfolio page had no usable data; placeholder rows were written",
        ));
    }

    let store = LocalObjectStore::new(config.storage_root.clone());
    let upload = args.bucket.as_deref().map(|bucket| UploadTarget {
        store: &store,
        bucket,
    });

    let report = RawWriter::new(config.raw_prefix.clone()).write(&snapshot.rows, &args.output_dir, upload)?;
    warnings.extend(report.warnings.iter().cloned());

    tracing::info!(
        source = snapshot.source.as_str(),
        rows = report.row_count,
        path = %report.local_path.display(),
        "scrape complete"
    );

    let data = json!({
        "source": snapshot.source,
        "trade_date": report.partition.to_string(),
        "collected_at": snapshot.collected_at,
        "row_count": report.row_count,
        "skipped_count": snapshot.skipped.len(),
        "total_weight_percent": snapshot.total_weight_percent(),
        "local_path": report.local_path,
        "uploaded": report.uploaded,
    });

    Ok(CommandResult::ok(data).with_warnings(warnings))
}
