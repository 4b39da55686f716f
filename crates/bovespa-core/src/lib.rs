//! # Bovespa Core
//!
//! Core contracts and domain types for the IBOV portfolio pipeline.
//!
//! ## Overview
//!
//! This crate provides the pieces of the pipeline that do not touch DuckDB:
//!
//! - **Domain models** for scraped portfolio rows and partition keys
//! - **Snapshot fetcher** that scrapes the theoretical portfolio page
//! - **Ingest notifier** that turns storage notifications into transform runs
//! - **Catalog payload** handed to the catalog after a refined run
//! - **Object store** contract with a local filesystem implementation
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`catalog`] | Catalog registration payload for the refined table |
//! | [`config`] | Pipeline configuration and home directory resolution |
//! | [`domain`] | `ConstituentRow`, `UtcDateTime`, partition keys |
//! | [`error`] | Validation errors |
//! | [`fetcher`] | HTML snapshot fetcher and extraction strategies |
//! | [`http_client`] | HTTP client abstraction (reqwest / static) |
//! | [`notifier`] | Storage-notification filtering and job launching |
//! | [`store`] | Object store contract and local implementation |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Snapshot Fetcher│────▶│ HTTP Client      │
//! └────────┬────────┘     │ (reqwest/static) │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Raw Writer      │────▶│ Object Store     │
//! │ (warehouse)     │     └────────┬─────────┘
//! └─────────────────┘              │ notification
//!                                  ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Ingest Notifier │────▶│ Job Launcher     │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every stage returns a typed `Result`. Row-level problems never fail a
//! fetch; they are reported in [`Snapshot::skipped`] for the caller to log.
//!
//! ```rust
//! use bovespa_core::fetcher::parse_snapshot;
//! use bovespa_core::UtcDateTime;
//!
//! let collected_at = UtcDateTime::parse("2026-10-16T18:30:00Z").unwrap();
//! let snapshot = parse_snapshot("<html><body>maintenance</body></html>", collected_at);
//! assert!(snapshot.is_fallback());
//! assert!(!snapshot.rows.is_empty());
//! ```

pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod notifier;
pub mod store;

pub use catalog::{CatalogRegistration, ColumnSpec};
pub use config::PipelineConfig;
pub use domain::{sanitize_class, ConstituentRow, PartitionDate, UtcDateTime};
pub use error::ValidationError;
pub use fetcher::{
    FetchError, IndexSnapshotFetcher, RowParseError, Snapshot, SnapshotSource,
    DEFAULT_SNAPSHOT_URL,
};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, StaticHttpClient,
};
pub use notifier::{
    FailedLaunch, IngestNotifier, JobArguments, JobLauncher, JobRun, LaunchError, NotificationBatch,
    NotificationError, NotificationRecord, NotifierOutcome, SkippedRecord,
};
pub use store::{LocalObjectStore, ObjectLocation, ObjectStore, StoreError};
