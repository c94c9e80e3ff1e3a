//! S3 Duty Log Store
//!
//! Implements the `DutyLogStore` port on an S3 bucket. Every segment revision
//! and every violation record is its own JSON object; see [`keys`](super::keys)
//! for the layout. Objects are written once per key and never deleted, which
//! keeps the store append-only.

use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use haulwatch_domain::{
    hos::{DriverId, DutyStatusSegment, HosError, Result, Violation},
    ports::{DutyLogStore, TransitionCommit},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error, info, instrument};

use super::keys;
use super::objects::{Bucket, ObjectError};

#[derive(Debug, Serialize, Deserialize)]
struct DriverRecord {
    driver_id: DriverId,
}

/// S3-backed duty-status log
///
/// ## Write order
///
/// A transition writes its violations first, then the closed revision of the
/// previous segment (same key as the open one it replaces), and the new open
/// segment last. A commit that fails half-way leaves at most the old open
/// segment closed with no successor; violation keys are deterministic, so a
/// retried commit overwrites rather than duplicates them.
#[derive(Clone)]
pub struct S3LogStore {
    bucket: Bucket,
}

impl S3LogStore {
    /// Create a log store over `bucket`
    ///
    /// ```rust,no_run
    /// use aws_sdk_s3::Client;
    /// use haulwatch_s3::S3LogStore;
    ///
    /// # async fn example() {
    /// let config = aws_config::load_from_env().await;
    /// let store = S3LogStore::new(Client::new(&config), "hos-logs".to_string());
    /// # }
    /// ```
    pub fn new(client: Client, bucket: String) -> Self {
        info!(bucket = %bucket, "Initializing S3LogStore");
        Self {
            bucket: Bucket::new(client, bucket),
        }
    }

    pub fn bucket(&self) -> &str {
        self.bucket.name()
    }

    /// Add a driver to the fleet directory
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    pub async fn register_driver(&self, driver_id: &DriverId) -> Result<()> {
        let record = DriverRecord {
            driver_id: driver_id.clone(),
        };
        self.bucket
            .put_json(&keys::driver_key(driver_id), &record)
            .await
            .map_err(ObjectError::into_storage)?;
        info!(driver_id = %driver_id, "Registered driver");
        Ok(())
    }
}

/// Latest revision keys for a driver, trimmed to the segment covering `since`
/// and everything after it
async fn segment_keys(
    bucket: &Bucket,
    driver_id: &DriverId,
    since: Option<DateTime<Utc>>,
) -> std::result::Result<Vec<String>, ObjectError> {
    let listed = bucket
        .list_keys(&keys::segment_prefix(driver_id), None)
        .await?;
    let latest = keys::latest_segment_keys(&listed);

    let first = since
        .and_then(|since| {
            let since = since.timestamp();
            latest.iter().rposition(|(start, _)| *start <= since)
        })
        .unwrap_or(0);
    Ok(latest.into_iter().skip(first).map(|(_, key)| key).collect())
}

async fn fetch_segments(
    bucket: &Bucket,
    keys: &[String],
) -> std::result::Result<Vec<DutyStatusSegment>, ObjectError> {
    let mut segments = Vec::with_capacity(keys.len());
    for key in keys {
        segments.push(bucket.get_json::<DutyStatusSegment>(key).await?);
    }
    Ok(segments)
}

fn storage_error(operation: &str, driver_id: &DriverId, err: ObjectError) -> HosError {
    error!(driver_id = %driver_id, operation, error = %err, "S3 log store operation failed");
    err.into_storage()
}

impl DutyLogStore for S3LogStore {
    #[instrument(skip(self), fields(driver_id = %driver_id))]
    fn driver_exists(&self, driver_id: &DriverId) -> impl Future<Output = Result<bool>> + Send {
        let bucket = self.bucket.clone();
        let driver_id = driver_id.clone();

        async move {
            let exists = bucket
                .exists(&keys::driver_key(&driver_id))
                .await
                .map_err(|err| storage_error("driver_exists", &driver_id, err))?;
            debug!(driver_id = %driver_id, exists, "Checked driver directory");
            Ok(exists)
        }
    }

    #[instrument(skip(self), fields(driver_id = %driver_id))]
    fn load_segments(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<DutyStatusSegment>>> + Send {
        let bucket = self.bucket.clone();
        let driver_id = driver_id.clone();

        async move {
            let keys = segment_keys(&bucket, &driver_id, since)
                .await
                .map_err(|err| storage_error("load_segments", &driver_id, err))?;
            let segments = fetch_segments(&bucket, &keys)
                .await
                .map_err(|err| storage_error("load_segments", &driver_id, err))?;

            let segments: Vec<DutyStatusSegment> = match since {
                Some(since) => segments
                    .into_iter()
                    .filter(|segment| segment.end_time().map_or(true, |end| end > since))
                    .collect(),
                None => segments,
            };
            debug!(driver_id = %driver_id, count = segments.len(), "Loaded segments from S3");
            Ok(segments)
        }
    }

    #[instrument(skip(self), fields(driver_id = %driver_id))]
    fn load_violations(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<Violation>>> + Send {
        let bucket = self.bucket.clone();
        let driver_id = driver_id.clone();

        async move {
            let start_after = since.map(|since| keys::violations_start_after(&driver_id, since));
            let listed = bucket
                .list_keys(&keys::violation_prefix(&driver_id), start_after)
                .await
                .map_err(|err| storage_error("load_violations", &driver_id, err))?;

            let mut records = Vec::with_capacity(listed.len());
            for key in &listed {
                let record: Violation = bucket
                    .get_json(key)
                    .await
                    .map_err(|err| storage_error("load_violations", &driver_id, err))?;
                if since.map_or(true, |since| record.detected_at >= since) {
                    records.push(record);
                }
            }
            records.sort_by_key(|v| v.detected_at);
            debug!(driver_id = %driver_id, count = records.len(), "Loaded violations from S3");
            Ok(records)
        }
    }

    #[instrument(skip(self, commit), fields(driver_id = %commit.driver_id, violations = commit.violations.len()))]
    fn commit_transition(
        &self,
        commit: &TransitionCommit,
    ) -> impl Future<Output = Result<()>> + Send {
        let bucket = self.bucket.clone();
        let commit = commit.clone();

        async move {
            let driver_id = &commit.driver_id;

            // Optimistic check: the segment being closed must be the open one
            let latest = segment_keys(&bucket, driver_id, None)
                .await
                .map_err(|err| storage_error("commit_transition", driver_id, err))?;
            let open_start = match latest.last() {
                Some(key) => {
                    let last: DutyStatusSegment = bucket
                        .get_json(key)
                        .await
                        .map_err(|err| storage_error("commit_transition", driver_id, err))?;
                    last.is_open().then(|| last.start_time())
                }
                None => None,
            };
            let expected = commit.closed.as_ref().map(DutyStatusSegment::start_time);
            if open_start != expected {
                return Err(HosError::OverlappingSegment {
                    requested: commit.opened.start_time(),
                    open_start: open_start.unwrap_or_else(|| commit.opened.start_time()),
                });
            }

            for violation in &commit.violations {
                bucket
                    .put_json(&keys::violation_key(violation), violation)
                    .await
                    .map_err(|err| storage_error("commit_transition", driver_id, err))?;
            }
            if let Some(closed) = &commit.closed {
                bucket
                    .put_json(&keys::segment_key(closed), closed)
                    .await
                    .map_err(|err| storage_error("commit_transition", driver_id, err))?;
            }
            bucket
                .put_json(&keys::segment_key(&commit.opened), &commit.opened)
                .await
                .map_err(|err| storage_error("commit_transition", driver_id, err))?;

            info!(
                driver_id = %driver_id,
                status = %commit.opened.status(),
                start_time = %commit.opened.start_time(),
                "Committed transition to S3"
            );
            Ok(())
        }
    }

    #[instrument(skip(self, segment), fields(driver_id = %segment.driver_id(), revision = segment.revision()))]
    fn record_correction(
        &self,
        segment: &DutyStatusSegment,
    ) -> impl Future<Output = Result<()>> + Send {
        let bucket = self.bucket.clone();
        let segment = segment.clone();

        async move {
            let key = keys::segment_key(&segment);
            bucket
                .put_json(&key, &segment)
                .await
                .map_err(|err| storage_error("record_correction", segment.driver_id(), err))?;
            info!(key = %key, "Stored corrected segment revision");
            Ok(())
        }
    }

    #[instrument(skip(self, violations), fields(driver_id = %driver_id, count = violations.len()))]
    fn append_violations(
        &self,
        driver_id: &DriverId,
        violations: &[Violation],
    ) -> impl Future<Output = Result<()>> + Send {
        let bucket = self.bucket.clone();
        let driver_id = driver_id.clone();
        let violations = violations.to_vec();

        async move {
            for violation in &violations {
                bucket
                    .put_json(&keys::violation_key(violation), violation)
                    .await
                    .map_err(|err| storage_error("append_violations", &driver_id, err))?;
            }
            debug!(driver_id = %driver_id, count = violations.len(), "Appended violations");
            Ok(())
        }
    }
}
