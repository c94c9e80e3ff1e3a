//! DTOs for Hours-of-Service endpoints

use chrono::{DateTime, Utc};
use haulwatch_domain::hos::{
    Comparison, CorrectionOutcome, DriverId, DriverStanding, DutyStatus, DutyStatusSegment,
    HosError, RecomputeReport, RuleSet, SegmentCorrection, TransitionOutcome, TransitionRequest,
    VehicleId, Violation, ViolationId,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

fn parse_status(status: &str) -> Result<DutyStatus, HosError> {
    status.parse()
}

/// Request body for a duty-status change
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionBody {
    #[schema(example = "drv-1042")]
    pub driver_id: String,
    /// Required when the new status is `driving`
    #[schema(example = "truck-17")]
    pub vehicle_id: Option<String>,
    /// One of `off_duty`, `sleeper_berth`, `driving`, `on_duty_not_driving`
    #[schema(example = "driving")]
    pub status: String,
    /// Event time, truncated to whole seconds
    pub timestamp: DateTime<Utc>,
    pub odometer: Option<f64>,
    #[schema(example = "Reno, NV")]
    pub location: Option<String>,
}

impl TransitionBody {
    pub fn into_request(self) -> Result<TransitionRequest, HosError> {
        Ok(TransitionRequest {
            driver_id: DriverId::new(self.driver_id),
            vehicle_id: self.vehicle_id.map(VehicleId::new),
            status: parse_status(&self.status)?,
            timestamp: self.timestamp,
            odometer_reading: self.odometer,
            location: self.location,
        })
    }
}

/// One interval of a driver's duty-status log
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SegmentResponse {
    pub driver_id: String,
    pub vehicle_id: Option<String>,
    #[schema(example = "driving")]
    pub status: String,
    pub start_time: DateTime<Utc>,
    /// Absent while the segment is open
    pub end_time: Option<DateTime<Utc>>,
    pub start_location: Option<String>,
    pub odometer: Option<f64>,
    pub revision: u32,
}

impl From<&DutyStatusSegment> for SegmentResponse {
    fn from(segment: &DutyStatusSegment) -> Self {
        Self {
            driver_id: segment.driver_id().to_string(),
            vehicle_id: segment.vehicle_id().map(ToString::to_string),
            status: segment.status().to_string(),
            start_time: segment.start_time(),
            end_time: segment.end_time(),
            start_location: segment.start_location().map(str::to_string),
            odometer: segment.odometer_reading(),
            revision: segment.revision(),
        }
    }
}

/// A stored warning or violation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ViolationResponse {
    pub id: Uuid,
    pub driver_id: String,
    #[schema(example = "DRIVE_11H")]
    pub rule_id: String,
    #[schema(example = "violation")]
    pub severity: String,
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub measured_secs: i64,
    pub limit_secs: i64,
    /// Record this one replaces, for recomputed findings
    pub supersedes: Option<Uuid>,
}

impl From<&Violation> for ViolationResponse {
    fn from(v: &Violation) -> Self {
        Self {
            id: *v.id.as_uuid(),
            driver_id: v.driver_id.to_string(),
            rule_id: v.rule_id.to_string(),
            severity: v.severity.to_string(),
            detected_at: v.detected_at,
            window_start: v.window_start,
            window_end: v.window_end,
            measured_secs: v.measured_secs,
            limit_secs: v.limit_secs,
            supersedes: v.supersedes.as_ref().map(|id| *id.as_uuid()),
        }
    }
}

fn violations(records: &[Violation]) -> Vec<ViolationResponse> {
    records.iter().map(ViolationResponse::from).collect()
}

fn ids(ids: &[ViolationId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

/// Response body for an accepted transition
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionResponse {
    /// The newly opened segment
    pub segment: SegmentResponse,
    /// The segment the transition closed, if any
    pub closed: Option<SegmentResponse>,
    /// Findings raised while closing the previous segment
    pub violations: Vec<ViolationResponse>,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            segment: SegmentResponse::from(&outcome.segment),
            closed: outcome.closed.as_ref().map(SegmentResponse::from),
            violations: violations(&outcome.violations),
        }
    }
}

/// Rolling-window totals for a driver at one instant
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AggregatesResponse {
    pub driver_id: String,
    #[schema(example = "us-federal")]
    pub rule_set: String,
    pub as_of: DateTime<Utc>,
    pub duty_period_start: Option<DateTime<Utc>>,
    pub period_follows_qualifying_rest: bool,
    pub driving_secs: i64,
    pub duty_elapsed_secs: i64,
    pub seven_day_duty_secs: i64,
    pub eight_day_duty_secs: i64,
    pub driving_since_break_secs: i64,
    pub break_window_start: Option<DateTime<Utc>>,
    pub current_rest_secs: i64,
    pub rest_qualified: bool,
    /// Thresholds currently reached, most severe first
    pub findings: Vec<ViolationResponse>,
}

impl From<DriverStanding> for AggregatesResponse {
    fn from(standing: DriverStanding) -> Self {
        let a = standing.aggregates;
        Self {
            driver_id: standing.driver_id.to_string(),
            rule_set: standing.rule_set,
            as_of: a.as_of,
            duty_period_start: a.duty_period_start,
            period_follows_qualifying_rest: a.period_follows_qualifying_rest,
            driving_secs: a.driving_secs,
            duty_elapsed_secs: a.duty_elapsed_secs,
            seven_day_duty_secs: a.seven_day_duty_secs,
            eight_day_duty_secs: a.eight_day_duty_secs,
            driving_since_break_secs: a.driving_since_break_secs,
            break_window_start: a.break_window_start,
            current_rest_secs: a.current_rest_secs,
            rest_qualified: a.rest_qualified,
            findings: violations(&standing.findings),
        }
    }
}

/// Outcome of replaying a driver's history
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecomputeResponse {
    pub driver_id: String,
    #[schema(example = "retroactive")]
    pub policy: String,
    pub from: Option<DateTime<Utc>>,
    pub replayed_segments: usize,
    pub unchanged: usize,
    pub added: Vec<ViolationResponse>,
    pub superseded: Vec<Uuid>,
    pub stale: Vec<Uuid>,
}

impl From<RecomputeReport> for RecomputeResponse {
    fn from(report: RecomputeReport) -> Self {
        Self {
            driver_id: report.driver_id.to_string(),
            policy: report.policy.to_string(),
            from: report.from,
            replayed_segments: report.replayed_segments,
            unchanged: report.unchanged,
            added: violations(&report.added),
            superseded: ids(&report.superseded),
            stale: ids(&report.stale),
        }
    }
}

/// Fields of a segment that may be corrected; times are fixed
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CorrectionBody {
    #[schema(example = "on_duty_not_driving")]
    pub status: Option<String>,
    pub vehicle_id: Option<String>,
    pub odometer: Option<f64>,
    pub location: Option<String>,
}

impl CorrectionBody {
    pub fn into_correction(self) -> Result<SegmentCorrection, HosError> {
        Ok(SegmentCorrection {
            status: self.status.as_deref().map(parse_status).transpose()?,
            vehicle_id: self.vehicle_id.map(VehicleId::new),
            odometer_reading: self.odometer,
            start_location: self.location,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CorrectionResponse {
    /// The stored revision
    pub segment: SegmentResponse,
    pub recompute: RecomputeResponse,
}

impl From<CorrectionOutcome> for CorrectionResponse {
    fn from(outcome: CorrectionOutcome) -> Self {
        Self {
            segment: SegmentResponse::from(&outcome.segment),
            recompute: RecomputeResponse::from(outcome.recompute),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RuleLimitResponse {
    #[schema(example = "DRIVE_11H")]
    pub rule_id: String,
    pub limit_secs: i64,
    pub warning_secs: Option<i64>,
    #[schema(example = "at_least")]
    pub comparison: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SplitSleeperResponse {
    pub min_sleeper_secs: i64,
    pub min_companion_secs: i64,
    pub min_total_secs: i64,
}

/// The active jurisdiction's limits
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RuleSetResponse {
    #[schema(example = "us-federal")]
    pub name: String,
    pub qualifying_rest_secs: i64,
    pub min_break_secs: i64,
    pub split_sleeper: Option<SplitSleeperResponse>,
    pub rules: Vec<RuleLimitResponse>,
}

impl From<&RuleSet> for RuleSetResponse {
    fn from(set: &RuleSet) -> Self {
        Self {
            name: set.name.clone(),
            qualifying_rest_secs: set.qualifying_rest_secs,
            min_break_secs: set.min_break_secs,
            split_sleeper: set.split_sleeper.map(|split| SplitSleeperResponse {
                min_sleeper_secs: split.min_sleeper_secs,
                min_companion_secs: split.min_companion_secs,
                min_total_secs: split.min_total_secs,
            }),
            rules: set
                .rules
                .iter()
                .map(|(rule_id, limit)| RuleLimitResponse {
                    rule_id: rule_id.to_string(),
                    limit_secs: limit.limit_secs,
                    warning_secs: limit.warning_secs,
                    comparison: match limit.comparison {
                        Comparison::AtLeast => "at_least",
                        Comparison::Exceeds => "exceeds",
                    }
                    .to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AsOfQuery {
    /// Query instant (default: now)
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SinceQuery {
    /// Only violations detected at or after this instant
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FromQuery {
    /// Correction point honoured by the prospective policy
    pub from: Option<DateTime<Utc>>,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable code
    #[schema(example = "ERR_NO_QUALIFYING_REST")]
    pub code: String,
    /// Error description
    #[schema(example = "36000s of qualifying rest required before driving, found 28800s")]
    pub message: String,
}
