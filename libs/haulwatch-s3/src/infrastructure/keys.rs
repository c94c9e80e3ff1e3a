//! Object key layout
//!
//! ```text
//! drivers/{driver_id}.json
//! segments/{driver_id}/{start_secs:012}-r{revision:04}.json
//! violations/{driver_id}/{detected_secs:012}-{rule_id}-{severity}-{window_start_secs:012}[-s{superseded_id}].json
//! dvir/{vehicle_id}/{inspected_secs:012}.json
//! ```
//!
//! Timestamps are zero-padded unix seconds so that lexicographic listing
//! order is time order.

use chrono::{DateTime, Utc};
use haulwatch_domain::hos::{DriverId, DutyStatusSegment, DvirReport, VehicleId, Violation};

const JSON: &str = ".json";

fn file_name(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.strip_suffix(JSON).unwrap_or(name)
}

fn leading_secs(name: &str) -> Option<i64> {
    name.get(..12)?.parse().ok()
}

pub(crate) fn driver_key(driver_id: &DriverId) -> String {
    format!("drivers/{}{}", driver_id, JSON)
}

pub(crate) fn segment_prefix(driver_id: &DriverId) -> String {
    format!("segments/{}/", driver_id)
}

pub(crate) fn segment_key(segment: &DutyStatusSegment) -> String {
    format!(
        "{}{:012}-r{:04}{}",
        segment_prefix(segment.driver_id()),
        segment.start_secs(),
        segment.revision(),
        JSON
    )
}

/// Keep the highest revision of each segment, in start order
///
/// `keys` must be in listing order.
pub(crate) fn latest_segment_keys(keys: &[String]) -> Vec<(i64, String)> {
    let mut latest: Vec<(i64, String)> = Vec::new();
    for key in keys {
        let Some(start) = leading_secs(file_name(key)) else {
            continue;
        };
        match latest.last_mut() {
            Some((last_start, last_key)) if *last_start == start => *last_key = key.clone(),
            _ => latest.push((start, key.clone())),
        }
    }
    latest
}

pub(crate) fn violation_prefix(driver_id: &DriverId) -> String {
    format!("violations/{}/", driver_id)
}

pub(crate) fn violation_key(violation: &Violation) -> String {
    let superseded = violation
        .supersedes
        .map(|id| format!("-s{}", id))
        .unwrap_or_default();
    format!(
        "{}{:012}-{}-{}-{:012}{}{}",
        violation_prefix(&violation.driver_id),
        violation.detected_at.timestamp(),
        violation.rule_id,
        violation.severity,
        violation.window_start.timestamp(),
        superseded,
        JSON
    )
}

/// Listing marker that skips every violation detected before `since`
pub(crate) fn violations_start_after(driver_id: &DriverId, since: DateTime<Utc>) -> String {
    format!("{}{:012}", violation_prefix(driver_id), since.timestamp())
}

pub(crate) fn dvir_prefix(vehicle_id: &VehicleId) -> String {
    format!("dvir/{}/", vehicle_id)
}

pub(crate) fn dvir_key(report: &DvirReport) -> String {
    format!(
        "{}{:012}{}",
        dvir_prefix(&report.vehicle_id),
        report.inspected_at.timestamp(),
        JSON
    )
}

/// Key of the latest report inspected at or before `as_of`
pub(crate) fn latest_dvir_key(keys: &[String], as_of: DateTime<Utc>) -> Option<&String> {
    let as_of = as_of.timestamp();
    keys.iter()
        .filter_map(|key| leading_secs(file_name(key)).map(|secs| (secs, key)))
        .filter(|(secs, _)| *secs <= as_of)
        .max_by_key(|(secs, _)| *secs)
        .map(|(_, key)| key)
}
