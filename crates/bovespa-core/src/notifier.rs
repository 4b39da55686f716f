//! # Ingest Notifier
//!
//! Filters storage "object created" notifications and starts one transform
//! job run per new raw partition file.
//!
//! The batch never fails as a whole: every record ends up either as a
//! [`JobRun`], a [`SkippedRecord`] (filtered out) or a failed launch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;

/// Source tag carried by storage notifications.
pub const STORAGE_EVENT_SOURCE: &str = "aws:s3";

/// Notification payload: `{"Records": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

impl NotificationBatch {
    pub fn from_json(payload: &str) -> Result<Self, NotificationError> {
        serde_json::from_str(payload).map_err(|err| NotificationError::Malformed {
            message: err.to_string(),
        })
    }

    /// One `ObjectCreated:Put` record per key, as the storage service emits them.
    pub fn object_created(bucket: &str, keys: &[&str]) -> Self {
        Self {
            records: keys
                .iter()
                .map(|key| NotificationRecord {
                    event_source: Some(String::from(STORAGE_EVENT_SOURCE)),
                    event_name: Some(String::from("ObjectCreated:Put")),
                    s3: Some(StorageEntity {
                        bucket: Some(BucketEntity {
                            name: Some(bucket.to_owned()),
                        }),
                        object: Some(ObjectEntity {
                            key: Some(encode_key(key)),
                            size: None,
                        }),
                    }),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventSource", default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<StorageEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl NotificationRecord {
    fn bucket(&self) -> Option<&str> {
        self.s3
            .as_ref()?
            .bucket
            .as_ref()?
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    fn raw_key(&self) -> Option<&str> {
        self.s3
            .as_ref()?
            .object
            .as_ref()?
            .key
            .as_deref()
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationError {
    #[error("notification payload is not valid JSON: {message}")]
    Malformed { message: String },
    #[error("event source '{source_tag}' is not a storage event")]
    UnrecognizedSource { source_tag: String },
    #[error("record has no bucket name")]
    MissingBucket,
    #[error("record has no object key")]
    MissingKey,
    #[error("key '{key}' is not a raw partition file")]
    KeyNotMatched { key: String },
}

/// Failure reported by a [`JobLauncher`].
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("failed to start job '{job_name}': {message}")]
pub struct LaunchError {
    pub job_name: String,
    pub message: String,
}

/// Parameters handed to one transform job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArguments {
    pub input_bucket: String,
    pub input_key: String,
    pub output_bucket: String,
    pub output_prefix: String,
    pub enable_metrics: bool,
    pub continuous_logging: bool,
}

impl JobArguments {
    /// Flag-style argument map in the form job runners accept.
    pub fn to_argument_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(String::from("--input_bucket"), self.input_bucket.clone());
        map.insert(String::from("--input_key"), self.input_key.clone());
        map.insert(String::from("--output_bucket"), self.output_bucket.clone());
        map.insert(String::from("--output_prefix"), self.output_prefix.clone());
        if self.enable_metrics {
            map.insert(String::from("--enable-metrics"), String::new());
        }
        map.insert(
            String::from("--enable-continuous-cloudwatch-log"),
            self.continuous_logging.to_string(),
        );
        map.insert(String::from("--job-language"), String::from("rust"));
        map
    }
}

/// Starts a run of the transform job and returns its run id.
pub trait JobLauncher {
    fn start_job_run(&self, job_name: &str, args: &JobArguments) -> Result<String, LaunchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRun {
    pub bucket: String,
    pub object_key: String,
    pub job_run_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: NotificationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLaunch {
    pub index: usize,
    pub bucket: String,
    pub object_key: String,
    pub error: LaunchError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifierOutcome {
    pub records_seen: usize,
    pub job_runs: Vec<JobRun>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<FailedLaunch>,
}

impl NotifierOutcome {
    pub fn is_empty_batch(&self) -> bool {
        self.records_seen == 0
    }
}

/// Record filter plus the job parameters it forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestNotifier {
    raw_prefix: String,
    file_suffix: String,
    job_name: String,
    output_prefix: String,
    enable_metrics: bool,
    continuous_logging: bool,
}

impl Default for IngestNotifier {
    fn default() -> Self {
        Self {
            raw_prefix: String::from("raw-data/"),
            file_suffix: String::from(".parquet"),
            job_name: String::from("bovespa-etl-job"),
            output_prefix: String::from("refined-data/"),
            enable_metrics: true,
            continuous_logging: true,
        }
    }
}

impl IngestNotifier {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            raw_prefix: config.raw_prefix.clone(),
            file_suffix: config.raw_file_suffix.clone(),
            job_name: config.job_name.clone(),
            output_prefix: config.refined_prefix.clone(),
            enable_metrics: config.enable_metrics,
            continuous_logging: config.continuous_logging,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Processes every record; launcher errors do not stop the batch.
    pub fn handle(&self, batch: &NotificationBatch, launcher: &dyn JobLauncher) -> NotifierOutcome {
        let mut outcome = NotifierOutcome {
            records_seen: batch.records.len(),
            ..NotifierOutcome::default()
        };
        if batch.records.is_empty() {
            tracing::warn!("notification batch has no records");
            return outcome;
        }

        for (index, record) in batch.records.iter().enumerate() {
            let (bucket, key) = match self.accept(record) {
                Ok(accepted) => accepted,
                Err(reason) => {
                    tracing::info!(index, %reason, "notification record skipped");
                    outcome.skipped.push(SkippedRecord { index, reason });
                    continue;
                }
            };

            let args = JobArguments {
                input_bucket: bucket.clone(),
                input_key: key.clone(),
                output_bucket: bucket.clone(),
                output_prefix: self.output_prefix.clone(),
                enable_metrics: self.enable_metrics,
                continuous_logging: self.continuous_logging,
            };

            match launcher.start_job_run(&self.job_name, &args) {
                Ok(job_run_id) => {
                    tracing::info!(job = %self.job_name, %job_run_id, bucket = %bucket, key = %key, "job run started");
                    outcome.job_runs.push(JobRun {
                        bucket,
                        object_key: key,
                        job_run_id,
                    });
                }
                Err(error) => {
                    tracing::error!(%error, bucket = %bucket, key = %key, "job run not started");
                    outcome.failed.push(FailedLaunch {
                        index,
                        bucket,
                        object_key: key,
                        error,
                    });
                }
            }
        }

        outcome
    }

    /// Bucket and decoded key of a record that should trigger a run.
    pub fn accept(&self, record: &NotificationRecord) -> Result<(String, String), NotificationError> {
        let source = record.event_source.as_deref().unwrap_or_default();
        if source != STORAGE_EVENT_SOURCE {
            return Err(NotificationError::UnrecognizedSource {
                source_tag: source.to_owned(),
            });
        }

        let bucket = record.bucket().ok_or(NotificationError::MissingBucket)?;
        let raw_key = record.raw_key().ok_or(NotificationError::MissingKey)?;
        let key = decode_key(raw_key);

        if !key.starts_with(&self.raw_prefix) || !key.ends_with(&self.file_suffix) {
            return Err(NotificationError::KeyNotMatched { key });
        }

        Ok((bucket.to_owned(), key))
    }
}

/// Storage notifications form-encode keys: `+` is a space, the rest is percent-encoded.
fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).replace("%20", "+"))
        .collect::<Vec<_>>()
        .join("/")
}
