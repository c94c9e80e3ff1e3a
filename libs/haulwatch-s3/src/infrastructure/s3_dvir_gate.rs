//! S3 DVIR Gate
//!
//! Reads driver-vehicle inspection reports written by the inspection workflow
//! under `dvir/{vehicle_id}/`. The latest report inspected at or before the
//! query instant decides whether the vehicle may be driven.

use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use haulwatch_domain::{
    hos::{DvirReport, Result, VehicleId},
    ports::VehicleInspectionGate,
};
use std::future::Future;
use tracing::{debug, info, instrument, warn};

use super::keys;
use super::objects::{Bucket, ObjectError};

#[derive(Clone)]
pub struct S3DvirGate {
    bucket: Bucket,
}

impl S3DvirGate {
    pub fn new(client: Client, bucket: String) -> Self {
        info!(bucket = %bucket, "Initializing S3DvirGate");
        Self {
            bucket: Bucket::new(client, bucket),
        }
    }

    pub fn bucket(&self) -> &str {
        self.bucket.name()
    }

    /// Store an inspection report
    #[instrument(skip(self, report), fields(vehicle_id = %report.vehicle_id))]
    pub async fn record_report(&self, report: &DvirReport) -> Result<()> {
        self.bucket
            .put_json(&keys::dvir_key(report), report)
            .await
            .map_err(ObjectError::into_gate)
    }
}

impl VehicleInspectionGate for S3DvirGate {
    #[instrument(skip(self), fields(vehicle_id = %vehicle_id, as_of = %as_of))]
    fn is_vehicle_certified(
        &self,
        vehicle_id: &VehicleId,
        as_of: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send {
        let bucket = self.bucket.clone();
        let vehicle_id = vehicle_id.clone();

        async move {
            let listed = bucket
                .list_keys(&keys::dvir_prefix(&vehicle_id), None)
                .await
                .map_err(|err| {
                    warn!(vehicle_id = %vehicle_id, error = %err, "DVIR lookup failed");
                    err.into_gate()
                })?;

            let Some(key) = keys::latest_dvir_key(&listed, as_of) else {
                debug!(vehicle_id = %vehicle_id, "No inspection report on record");
                return Ok(false);
            };
            let report: DvirReport = bucket.get_json(key).await.map_err(|err| {
                warn!(vehicle_id = %vehicle_id, key = %key, error = %err, "DVIR report unreadable");
                err.into_gate()
            })?;

            debug!(
                vehicle_id = %vehicle_id,
                inspected_at = %report.inspected_at,
                defects_cleared = report.defects_cleared,
                "Resolved inspection status"
            );
            Ok(report.defects_cleared)
        }
    }
}
