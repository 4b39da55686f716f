//! # Snapshot Fetcher
//!
//! Downloads the IBOV theoretical portfolio page and turns it into a
//! [`Snapshot`] of [`ConstituentRow`]s.
//!
//! Extraction tries, in order:
//!
//! 1. the first `<table>` (or `<div class="table">`) on the page
//! 2. a `"results"` array embedded in a `<script>` body
//! 3. three placeholder rows, flagged as [`SnapshotSource::Fallback`]
//!
//! Network failures are fatal. Individual bad rows are not: they land in
//! [`Snapshot::skipped`].

mod extract;
pub mod html;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ConstituentRow, UtcDateTime};

pub use extract::parse_locale_number;

/// Public B3 page listing the day's IBOV theoretical portfolio.
pub const DEFAULT_SNAPSHOT_URL: &str =
    "https://sistemaswebb3-listados.b3.com.br/indexPage/day/IBOV?language=pt-br";

const BROWSER_HEADERS: [(&str, &str); 6] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "pt-BR,pt;q=0.9,en;q=0.8"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure, timeout or non-2xx status. Fatal for the run.
    #[error("failed to fetch '{url}': {message}")]
    Network { url: String, message: String },
}

/// A row that could not be turned into a [`ConstituentRow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowParseError {
    /// Position of the row within its source (table row or array entry).
    pub row: usize,
    pub code: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for RowParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "row {} ({code}): {}", self.row, self.reason),
            None => write!(f, "row {}: {}", self.row, self.reason),
        }
    }
}

/// Which extraction strategy produced the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Table,
    ScriptJson,
    Fallback,
}

impl SnapshotSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::ScriptJson => "script_json",
            Self::Fallback => "fallback",
        }
    }
}

/// Rows scraped for one trading day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub rows: Vec<ConstituentRow>,
    pub skipped: Vec<RowParseError>,
    pub source: SnapshotSource,
    #[serde(serialize_with = "serialize_date")]
    pub trade_date: Date,
    pub collected_at: UtcDateTime,
}

impl Snapshot {
    pub fn is_fallback(&self) -> bool {
        self.source == SnapshotSource::Fallback
    }

    /// Sum of all weights; close to 100 for a complete portfolio.
    pub fn total_weight_percent(&self) -> f64 {
        self.rows.iter().map(|row| row.weight_percent).sum()
    }
}

fn serialize_date<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&crate::domain::PartitionDate::from_date(*date).to_string())
}

/// Parses a downloaded page. The trade date is the UTC day of `collected_at`.
pub fn parse_snapshot(html: &str, collected_at: UtcDateTime) -> Snapshot {
    let trade_date = collected_at.date();
    let mut skipped = Vec::new();

    if let Some(extraction) = extract::from_table(html, trade_date, collected_at) {
        skipped.extend(extraction.skipped);
        if !extraction.rows.is_empty() {
            return Snapshot {
                rows: extraction.rows,
                skipped,
                source: SnapshotSource::Table,
                trade_date,
                collected_at,
            };
        }
    }

    if let Some(extraction) = extract::from_scripts(html, trade_date, collected_at) {
        skipped.extend(extraction.skipped);
        if !extraction.rows.is_empty() {
            return Snapshot {
                rows: extraction.rows,
                skipped,
                source: SnapshotSource::ScriptJson,
                trade_date,
                collected_at,
            };
        }
    }

    Snapshot {
        rows: extract::fallback_rows(trade_date, collected_at),
        skipped,
        source: SnapshotSource::Fallback,
        trade_date,
        collected_at,
    }
}

/// Fetches the portfolio page through an injected [`HttpClient`].
#[derive(Clone)]
pub struct IndexSnapshotFetcher {
    http_client: Arc<dyn HttpClient>,
    url: String,
    timeout_ms: u64,
}

impl IndexSnapshotFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            url: String::from(DEFAULT_SNAPSHOT_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The GET request sent for each fetch.
    pub fn request(&self) -> HttpRequest {
        BROWSER_HEADERS.iter().fold(
            HttpRequest::get(&self.url).with_timeout_ms(self.timeout_ms),
            |request, (name, value)| request.with_header(*name, *value),
        )
    }

    /// One GET, no retries.
    pub async fn fetch(&self, collected_at: UtcDateTime) -> Result<Snapshot, FetchError> {
        tracing::info!(url = %self.url, "requesting portfolio page");

        let response = self
            .http_client
            .execute(self.request())
            .await
            .map_err(|err| FetchError::Network {
                url: self.url.clone(),
                message: err.message().to_owned(),
            })?;

        if !response.is_success() {
            return Err(FetchError::Network {
                url: self.url.clone(),
                message: format!("unexpected status {}", response.status),
            });
        }

        tracing::debug!(status = response.status, bytes = response.body.len(), "page received");
        Ok(parse_snapshot(&response.body, collected_at))
    }
}

impl std::fmt::Debug for IndexSnapshotFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshotFetcher")
            .field("url", &self.url)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}
