//! In-process job launcher.
//!
//! Runs the [`Transformer`] against the local object store instead of a
//! managed job runner, then registers the refined location in the catalog
//! and appends the run to the audit table.

use std::sync::Mutex;

use bovespa_core::domain::normalize_prefix;
use bovespa_core::{
    JobArguments, JobLauncher, LaunchError, LocalObjectStore, PartitionDate, UtcDateTime,
};
use uuid::Uuid;

use crate::{path_to_sql, RunStatus, TransformReport, TransformRun, Transformer, Warehouse, WarehouseError};

#[derive(Debug, Clone)]
struct CatalogTarget {
    warehouse: Warehouse,
    database: String,
    table: String,
}

#[derive(Debug)]
pub struct LocalTransformLauncher {
    store: LocalObjectStore,
    catalog: Option<CatalogTarget>,
    now: Option<UtcDateTime>,
    reports: Mutex<Vec<(String, TransformReport)>>,
}

impl LocalTransformLauncher {
    pub fn new(store: LocalObjectStore) -> Self {
        Self {
            store,
            catalog: None,
            now: None,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Registers refined output as `database.table` after each successful run.
    pub fn with_catalog(
        mut self,
        warehouse: Warehouse,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        self.catalog = Some(CatalogTarget {
            warehouse,
            database: database.into(),
            table: table.into(),
        });
        self
    }

    /// Pins the `now` used for `days_since_collection`.
    pub fn with_now(mut self, now: UtcDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Reports of the successful runs so far, keyed by run id.
    pub fn reports(&self) -> Vec<(String, TransformReport)> {
        match self.reports.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn run(
        &self,
        job_name: &str,
        run_id: &str,
        args: &JobArguments,
        started_at: UtcDateTime,
    ) -> Result<TransformReport, WarehouseError> {
        let input_path = self.store.resolve(&args.input_bucket, &args.input_key)?;
        let output_root = self.store.bucket_root(&args.output_bucket)?;
        let now = self.now.unwrap_or(started_at);

        let report = Transformer::new(args.output_prefix.clone()).transform(
            &input_path,
            &output_root,
            now,
        )?;

        if let Some(catalog) = &self.catalog {
            let location = output_root.join(normalize_prefix(&args.output_prefix));
            catalog
                .warehouse
                .register_refined(&catalog.database, &catalog.table, &location)?;
            catalog.warehouse.record_run(&TransformRun {
                run_id: run_id.to_owned(),
                job_name: job_name.to_owned(),
                input_path: path_to_sql(&input_path),
                output_root: path_to_sql(&output_root),
                groups_written: report.files.len(),
                status: RunStatus::Succeeded,
                message: None,
                started_at,
            })?;
        }

        Ok(report)
    }

    fn record_failure(
        &self,
        job_name: &str,
        run_id: &str,
        args: &JobArguments,
        started_at: UtcDateTime,
        error: &WarehouseError,
    ) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        let run = TransformRun {
            run_id: run_id.to_owned(),
            job_name: job_name.to_owned(),
            input_path: format!("{}/{}", args.input_bucket, args.input_key),
            output_root: args.output_bucket.clone(),
            groups_written: 0,
            status: RunStatus::Failed,
            message: Some(error.to_string()),
            started_at,
        };
        if let Err(audit_error) = catalog.warehouse.record_run(&run) {
            tracing::warn!(%run_id, error = %audit_error, "failed run not recorded");
        }
    }
}

impl JobLauncher for LocalTransformLauncher {
    fn start_job_run(&self, job_name: &str, args: &JobArguments) -> Result<String, LaunchError> {
        let run_id = format!("jr_{}", Uuid::new_v4().simple());
        let started_at = UtcDateTime::now();
        tracing::info!(
            job = job_name,
            %run_id,
            bucket = %args.input_bucket,
            key = %args.input_key,
            partition = ?PartitionDate::from_key(&args.input_key).map(|date| date.to_string()),
            arguments = ?args.to_argument_map(),
            "starting local transform run"
        );

        match self.run(job_name, &run_id, args, started_at) {
            Ok(report) => {
                match self.reports.lock() {
                    Ok(mut guard) => guard.push((run_id.clone(), report)),
                    Err(poisoned) => poisoned.into_inner().push((run_id.clone(), report)),
                }
                Ok(run_id)
            }
            Err(error) => {
                self.record_failure(job_name, &run_id, args, started_at, &error);
                Err(LaunchError {
                    job_name: job_name.to_owned(),
                    message: error.to_string(),
                })
            }
        }
    }
}
