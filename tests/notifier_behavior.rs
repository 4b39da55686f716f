//! Behavior-driven tests for the ingest notifier: which storage events start
//! a transform run, and what happens when the launcher refuses.

use std::sync::Mutex;

use bovespa_core::{
    IngestNotifier, JobArguments, JobLauncher, LaunchError, NotificationBatch, NotificationError,
};

/// Launcher double recording every request and failing on configured keys.
#[derive(Default)]
struct RecordingLauncher {
    started: Mutex<Vec<(String, JobArguments)>>,
    fail_keys: Vec<String>,
}

impl RecordingLauncher {
    fn failing_on(key: &str) -> Self {
        Self {
            fail_keys: vec![key.to_owned()],
            ..Self::default()
        }
    }

    fn started(&self) -> Vec<(String, JobArguments)> {
        self.started.lock().expect("lock").clone()
    }
}

impl JobLauncher for RecordingLauncher {
    fn start_job_run(&self, job_name: &str, args: &JobArguments) -> Result<String, LaunchError> {
        if self.fail_keys.contains(&args.input_key) {
            return Err(LaunchError {
                job_name: job_name.to_owned(),
                message: String::from("concurrent runs exceeded"),
            });
        }
        let mut started = self.started.lock().expect("lock");
        started.push((job_name.to_owned(), args.clone()));
        Ok(format!("jr_{}", started.len()))
    }
}

const RAW_KEY: &str = "raw-data/year=2026/month=10/day=16/ibov_portfolio_20261016.parquet";

// =============================================================================
// Filtering
// =============================================================================

#[test]
fn only_raw_parquet_keys_start_a_run() {
    // Given: one raw partition upload and one unrelated upload in the same batch
    let batch = NotificationBatch::object_created("bovespa", &[RAW_KEY, "other-data/file.csv"]);
    let launcher = RecordingLauncher::default();

    // When: the notifier handles the batch
    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    // Then: exactly one run is started, for the raw key
    assert_eq!(outcome.records_seen, 2);
    assert_eq!(outcome.job_runs.len(), 1);
    assert_eq!(outcome.job_runs[0].object_key, RAW_KEY);
    assert_eq!(outcome.job_runs[0].job_run_id, "jr_1");

    // And: the other record is reported as skipped, not failed
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].index, 1);
    assert_eq!(
        outcome.skipped[0].reason,
        NotificationError::KeyNotMatched {
            key: String::from("other-data/file.csv")
        }
    );
    assert!(outcome.failed.is_empty());
}

#[test]
fn unrelated_key_starts_nothing() {
    let batch = NotificationBatch::object_created("bovespa", &["other-data/file.csv"]);
    let launcher = RecordingLauncher::default();

    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    assert!(outcome.job_runs.is_empty());
    assert!(launcher.started().is_empty());
}

#[test]
fn raw_prefix_with_wrong_suffix_is_ignored() {
    let batch = NotificationBatch::object_created(
        "bovespa",
        &["raw-data/year=2026/month=10/day=16/ibov_portfolio_20261016.csv"],
    );
    let launcher = RecordingLauncher::default();

    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    assert!(outcome.job_runs.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
}

#[test]
fn non_storage_events_are_skipped() {
    let payload = r#"{"Records":[{"eventSource":"aws:sqs","body":"{}"}]}"#;
    let batch = NotificationBatch::from_json(payload).expect("valid json");
    let launcher = RecordingLauncher::default();

    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    assert!(outcome.job_runs.is_empty());
    assert!(matches!(
        outcome.skipped[0].reason,
        NotificationError::UnrecognizedSource { ref source_tag } if source_tag == "aws:sqs"
    ));
}

// =============================================================================
// Job parameters
// =============================================================================

#[test]
fn encoded_keys_are_decoded_before_launch() {
    let payload = r#"{"Records":[{
        "eventSource":"aws:s3",
        "eventName":"ObjectCreated:Put",
        "s3":{"bucket":{"name":"bovespa"},
              "object":{"key":"raw-data/year%3D2026/month%3D10/day%3D16/ibov+portfolio.parquet","size":2048}}
    }]}"#;
    let batch = NotificationBatch::from_json(payload).expect("valid json");
    let launcher = RecordingLauncher::default();

    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    assert_eq!(outcome.job_runs.len(), 1);
    let started = launcher.started();
    assert_eq!(
        started[0].1.input_key,
        "raw-data/year=2026/month=10/day=16/ibov portfolio.parquet"
    );
}

#[test]
fn launch_forwards_bucket_and_refined_prefix() {
    let batch = NotificationBatch::object_created("bovespa", &[RAW_KEY]);
    let launcher = RecordingLauncher::default();

    IngestNotifier::default().handle(&batch, &launcher);

    let started = launcher.started();
    let (job_name, args) = &started[0];
    assert_eq!(job_name, "bovespa-etl-job");
    assert_eq!(args.input_bucket, "bovespa");
    assert_eq!(args.output_bucket, "bovespa");

    let map = args.to_argument_map();
    assert_eq!(map["--input_key"], RAW_KEY);
    assert_eq!(map["--output_prefix"], "refined-data/");
    assert_eq!(map["--enable-continuous-cloudwatch-log"], "true");
    assert!(map.contains_key("--enable-metrics"));
    assert!(map.contains_key("--job-language"));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn launcher_error_is_recorded_and_batch_continues() {
    // Given: two raw uploads where the launcher refuses the first
    let second = "raw-data/year=2026/month=10/day=17/ibov_portfolio_20261017.parquet";
    let batch = NotificationBatch::object_created("bovespa", &[RAW_KEY, second]);
    let launcher = RecordingLauncher::failing_on(RAW_KEY);

    // When: the batch is handled
    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    // Then: the failure is reported and the second record still starts a run
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].index, 0);
    assert_eq!(outcome.failed[0].object_key, RAW_KEY);
    assert!(outcome.failed[0].error.message.contains("concurrent runs"));
    assert_eq!(outcome.job_runs.len(), 1);
    assert_eq!(outcome.job_runs[0].object_key, second);
}

#[test]
fn empty_batch_is_a_no_op() {
    let batch = NotificationBatch::from_json(r#"{"Records":[]}"#).expect("valid json");
    let launcher = RecordingLauncher::default();

    let outcome = IngestNotifier::default().handle(&batch, &launcher);

    assert!(outcome.is_empty_batch());
    assert!(outcome.job_runs.is_empty());
    assert!(launcher.started().is_empty());
}

#[test]
fn malformed_payload_is_rejected() {
    let error = NotificationBatch::from_json("{not json").expect_err("malformed");
    assert!(matches!(error, NotificationError::Malformed { .. }));
}
