//! Ports (trait definitions) for external dependencies
//!
//! The engine owns no long-term storage. The duty-status log, the inspection
//! workflow and wall-clock time are all collaborators behind these traits;
//! adapters (in-memory, S3) implement them and convert their own failures to
//! [`HosError`](crate::hos::HosError) values.
//!
//! ## Static Dispatch
//!
//! Async ports use `impl Future` return types rather than `async_trait`, so
//! every adapter is monomorphized into the service.

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::hos::{DriverId, DutyStatusSegment, Result, VehicleId, Violation};

/// Everything a committed transition writes, as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionCommit {
    pub driver_id: DriverId,
    /// The previously open segment, now closed at the transition timestamp
    pub closed: Option<DutyStatusSegment>,
    /// The segment opened by the transition
    pub opened: DutyStatusSegment,
    /// Findings produced while closing `closed`
    pub violations: Vec<Violation>,
}

/// Port for the per-driver duty-status log
///
/// Segments are keyed by `(driver_id, start_time)` and carry a revision;
/// corrections add a revision and never remove the previous one. Violations
/// are keyed by `(driver_id, rule_id, window_start)` plus their id and are
/// only ever appended.
pub trait DutyLogStore: Send + Sync {
    /// Whether the driver is known to the fleet directory
    fn driver_exists(&self, driver_id: &DriverId) -> impl Future<Output = Result<bool>> + Send;

    /// Latest revision of each segment, ordered by start time
    ///
    /// With `since`, only segments still running at or after `since` are
    /// returned: the segment covering `since` and everything after it.
    fn load_segments(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<DutyStatusSegment>>> + Send;

    /// Every stored violation record detected at or after `since`, superseded
    /// ones included, ordered by detection time
    fn load_violations(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<Violation>>> + Send;

    /// Persist a transition: close the open segment, open the new one and
    /// append the findings
    ///
    /// The new open segment must be the last thing to become visible so that
    /// a failed commit never leaves two open segments behind.
    fn commit_transition(
        &self,
        commit: &TransitionCommit,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store a corrected revision of an existing segment
    fn record_correction(
        &self,
        segment: &DutyStatusSegment,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append violation records produced outside the transition path
    fn append_violations(
        &self,
        driver_id: &DriverId,
        violations: &[Violation],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Port for the DVIR workflow
pub trait VehicleInspectionGate: Send + Sync {
    /// Whether the vehicle holds a cleared inspection as of `as_of`
    ///
    /// `Ok(false)` is a refusal; `Err` means the gate itself failed.
    fn is_vehicle_certified(
        &self,
        vehicle_id: &VehicleId,
        as_of: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Source of the current time, used for default query instants
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
