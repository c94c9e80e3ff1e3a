//! Domain entities for Hours-of-Service tracking
//!
//! This module defines the duty-status log model: the four legal duty
//! statuses, the contiguous segments a driver's day is made of, and the
//! immutable violation records the detector produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hos::error::HosError;
use crate::hos::ids::{DriverId, VehicleId, ViolationId};

/// One of the four legally defined duty statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyStatus {
    OffDuty,
    SleeperBerth,
    Driving,
    OnDutyNotDriving,
}

impl DutyStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OffDuty => "off_duty",
            Self::SleeperBerth => "sleeper_berth",
            Self::Driving => "driving",
            Self::OnDutyNotDriving => "on_duty_not_driving",
        }
    }

    /// Off duty and sleeper berth both count towards rest
    pub const fn is_rest(&self) -> bool {
        matches!(self, Self::OffDuty | Self::SleeperBerth)
    }

    /// Driving and on-duty-not-driving both count towards duty time
    pub const fn is_on_duty(&self) -> bool {
        !self.is_rest()
    }
}

impl fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DutyStatus {
    type Err = HosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off_duty" => Ok(Self::OffDuty),
            "sleeper_berth" => Ok(Self::SleeperBerth),
            "driving" => Ok(Self::Driving),
            "on_duty_not_driving" => Ok(Self::OnDutyNotDriving),
            other => Err(HosError::invalid_input(format!(
                "unknown duty status '{}'",
                other
            ))),
        }
    }
}

/// One interval of a driver's day
///
/// Segments for a driver are contiguous: the end of one is the start of the
/// next. `end_time` is `None` while the segment is open, and at most one
/// segment per driver is open at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyStatusSegment {
    driver_id: DriverId,
    vehicle_id: Option<VehicleId>,
    status: DutyStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    start_location: Option<String>,
    odometer_reading: Option<f64>,
    /// Bumped each time a correction is recorded for this segment
    #[serde(default)]
    revision: u32,
}

impl DutyStatusSegment {
    /// Open a new segment starting at `start_time`
    pub fn open(
        driver_id: DriverId,
        status: DutyStatus,
        start_time: DateTime<Utc>,
        vehicle_id: Option<VehicleId>,
    ) -> Self {
        Self {
            driver_id,
            vehicle_id,
            status,
            start_time,
            end_time: None,
            start_location: None,
            odometer_reading: None,
            revision: 0,
        }
    }

    /// Attach the location reported at the start of the segment
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.start_location = location;
        self
    }

    /// Attach the odometer reading reported at the start of the segment
    pub fn with_odometer(mut self, odometer: Option<f64>) -> Self {
        self.odometer_reading = odometer;
        self
    }

    /// Return a closed copy of this segment ending at `end_time`
    pub fn closed_at(&self, end_time: DateTime<Utc>) -> Self {
        let mut closed = self.clone();
        closed.end_time = Some(end_time);
        closed
    }

    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    pub fn vehicle_id(&self) -> Option<&VehicleId> {
        self.vehicle_id.as_ref()
    }

    pub fn status(&self) -> DutyStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn start_location(&self) -> Option<&str> {
        self.start_location.as_deref()
    }

    pub fn odometer_reading(&self) -> Option<f64> {
        self.odometer_reading
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Start of the segment in whole unix seconds
    pub fn start_secs(&self) -> i64 {
        self.start_time.timestamp()
    }

    /// End of the segment in whole unix seconds, or `as_of` while open
    pub fn end_secs_or(&self, as_of: i64) -> i64 {
        self.end_time.map_or(as_of, |end| end.timestamp())
    }

    /// Apply a correction, producing the next revision of this segment
    ///
    /// Start and end times are never corrected so contiguity with the
    /// neighbouring segments is preserved.
    pub fn corrected(&self, correction: &SegmentCorrection) -> Self {
        let mut next = self.clone();
        if let Some(status) = correction.status {
            next.status = status;
        }
        if let Some(vehicle_id) = &correction.vehicle_id {
            next.vehicle_id = Some(vehicle_id.clone());
        }
        if let Some(odometer) = correction.odometer_reading {
            next.odometer_reading = Some(odometer);
        }
        if let Some(location) = &correction.start_location {
            next.start_location = Some(location.clone());
        }
        next.revision = self.revision + 1;
        next
    }
}

/// Identifier of a rule in the rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "BREAK_30MIN")]
    Break30Min,
    #[serde(rename = "CYCLE_60_7")]
    Cycle60In7,
    #[serde(rename = "CYCLE_70_8")]
    Cycle70In8,
    #[serde(rename = "DRIVE_11H")]
    Drive11h,
    #[serde(rename = "DUTY_14H")]
    Duty14h,
}

impl RuleId {
    pub const ALL: [RuleId; 5] = [
        Self::Break30Min,
        Self::Cycle60In7,
        Self::Cycle70In8,
        Self::Drive11h,
        Self::Duty14h,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Break30Min => "BREAK_30MIN",
            Self::Cycle60In7 => "CYCLE_60_7",
            Self::Cycle70In8 => "CYCLE_70_8",
            Self::Drive11h => "DRIVE_11H",
            Self::Duty14h => "DUTY_14H",
        }
    }

    /// Rules measured within the current duty period (as opposed to the
    /// trailing multi-day cycle windows)
    pub const fn is_duty_period_rule(&self) -> bool {
        matches!(self, Self::Break30Min | Self::Drive11h | Self::Duty14h)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleId {
    type Err = HosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleId::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s)
            .ok_or_else(|| HosError::invalid_input(format!("unknown rule id '{}'", s)))
    }
}

/// How serious a finding is
///
/// Ordered so that `Violation > Warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Approaching the limit
    Warning,
    /// Limit exceeded
    Violation,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Violation => "violation",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compliance finding produced by the detector
///
/// Violations are never mutated once created. A correction that changes a
/// finding produces a new record whose `supersedes` points at the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub driver_id: DriverId,
    pub rule_id: RuleId,
    pub severity: Severity,
    /// The second the measured value crossed the threshold
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Measured duration in whole seconds
    pub measured_secs: i64,
    /// Threshold duration in whole seconds
    pub limit_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ViolationId>,
}

impl Violation {
    /// Everything but the record identity, used to compare findings across
    /// recomputations
    pub fn finding(&self) -> ViolationFinding {
        ViolationFinding {
            rule_id: self.rule_id,
            severity: self.severity,
            detected_at: self.detected_at,
            window_start: self.window_start,
            window_end: self.window_end,
            measured_secs: self.measured_secs,
            limit_secs: self.limit_secs,
        }
    }

    /// Storage key: `(rule_id, severity, window_start)` within one driver
    pub fn key(&self) -> (RuleId, Severity, DateTime<Utc>) {
        (self.rule_id, self.severity, self.window_start)
    }
}

/// Identity-free view of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViolationFinding {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub measured_secs: i64,
    pub limit_secs: i64,
}

/// Driver-Vehicle Inspection Report, as supplied by the inspection workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvirReport {
    pub vehicle_id: VehicleId,
    pub inspected_at: DateTime<Utc>,
    pub defects_cleared: bool,
}

/// A proposed duty-status change
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub driver_id: DriverId,
    pub vehicle_id: Option<VehicleId>,
    pub status: DutyStatus,
    pub timestamp: DateTime<Utc>,
    pub odometer_reading: Option<f64>,
    pub location: Option<String>,
}

impl TransitionRequest {
    pub fn new(driver_id: DriverId, status: DutyStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            vehicle_id: None,
            status,
            timestamp,
            odometer_reading: None,
            location: None,
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: VehicleId) -> Self {
        self.vehicle_id = Some(vehicle_id);
        self
    }
}

/// Result of a committed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    /// The newly opened segment
    pub segment: DutyStatusSegment,
    /// The segment that was closed at the transition timestamp, if any
    pub closed: Option<DutyStatusSegment>,
    /// Findings produced by the transition, most severe first
    pub violations: Vec<Violation>,
}

/// Fields of a historical segment that may be corrected after the fact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentCorrection {
    pub status: Option<DutyStatus>,
    pub vehicle_id: Option<VehicleId>,
    pub odometer_reading: Option<f64>,
    pub start_location: Option<String>,
}

impl SegmentCorrection {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.vehicle_id.is_none()
            && self.odometer_reading.is_none()
            && self.start_location.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_duty_status_round_trips_through_str() {
        for status in [
            DutyStatus::OffDuty,
            DutyStatus::SleeperBerth,
            DutyStatus::Driving,
            DutyStatus::OnDutyNotDriving,
        ] {
            assert_eq!(status.as_str().parse::<DutyStatus>().unwrap(), status);
        }
        assert!("napping".parse::<DutyStatus>().is_err());
    }

    #[test]
    fn test_rest_and_duty_partition() {
        assert!(DutyStatus::OffDuty.is_rest());
        assert!(DutyStatus::SleeperBerth.is_rest());
        assert!(DutyStatus::Driving.is_on_duty());
        assert!(DutyStatus::OnDutyNotDriving.is_on_duty());
    }

    #[test]
    fn test_segment_close() {
        let segment = DutyStatusSegment::open(
            DriverId::new("drv-1"),
            DutyStatus::Driving,
            at(6),
            Some(VehicleId::new("truck-1")),
        );
        assert!(segment.is_open());
        assert_eq!(segment.end_secs_or(at(7).timestamp()), at(7).timestamp());

        let closed = segment.closed_at(at(9));
        assert!(!closed.is_open());
        assert_eq!(closed.end_time(), Some(at(9)));
        assert_eq!(closed.end_secs_or(at(12).timestamp()), at(9).timestamp());
    }

    #[test]
    fn test_correction_keeps_times_and_bumps_revision() {
        let segment = DutyStatusSegment::open(
            DriverId::new("drv-1"),
            DutyStatus::OnDutyNotDriving,
            at(6),
            None,
        )
        .closed_at(at(8));

        let correction = SegmentCorrection {
            status: Some(DutyStatus::Driving),
            odometer_reading: Some(120_450.5),
            ..Default::default()
        };
        let next = segment.corrected(&correction);

        assert_eq!(next.status(), DutyStatus::Driving);
        assert_eq!(next.odometer_reading(), Some(120_450.5));
        assert_eq!(next.start_time(), segment.start_time());
        assert_eq!(next.end_time(), segment.end_time());
        assert_eq!(next.revision(), 1);
    }

    #[test]
    fn test_rule_id_wire_names() {
        assert_eq!(
            serde_json::to_string(&RuleId::Cycle60In7).unwrap(),
            "\"CYCLE_60_7\""
        );
        assert_eq!("DUTY_14H".parse::<RuleId>().unwrap(), RuleId::Duty14h);
        assert!(Severity::Violation > Severity::Warning);
    }
}
