//! Duty-status transitions for a single driver
//!
//! All four statuses are mutually reachable. A transition closes the open
//! segment at the requested timestamp and opens a new one starting at the
//! same instant, so the log stays contiguous. Entry into `driving` is gated
//! by the precondition checklist in [`gate`](crate::hos::gate).

use chrono::{DateTime, Utc};

use crate::hos::entity::{DutyStatusSegment, TransitionRequest};
use crate::hos::error::{HosError, Result};
use crate::hos::gate::{check_preconditions, GateFacts};
use crate::hos::rules::RuleSet;
use crate::hos::window::{RollingWindowCalculator, WindowAggregates};

/// A validated transition, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    /// The previously open segment, closed at the transition timestamp
    pub closed: Option<DutyStatusSegment>,
    /// The segment the transition opens
    pub opened: DutyStatusSegment,
    /// Aggregates at the transition instant, before the new segment starts
    pub aggregates: WindowAggregates,
}

#[derive(Debug, Clone, Copy)]
pub struct DutyStatusStateMachine<'a> {
    rules: &'a RuleSet,
}

impl<'a> DutyStatusStateMachine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Reject a timestamp that does not strictly follow the log
    ///
    /// A transition at the open segment's start would leave a zero-length
    /// segment behind; earlier than that would overlap it. Without an open
    /// segment the timestamp must equal the end of the closed history, so a
    /// commit that stopped after closing a segment is resumed without a gap.
    pub fn check_order(
        &self,
        open: Option<&DutyStatusSegment>,
        cursor: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let overlaps = match (open, cursor) {
            (Some(segment), _) => timestamp <= segment.start_time(),
            (None, Some(end)) => timestamp != end,
            (None, None) => false,
        };
        if overlaps {
            let open_start = open.map(DutyStatusSegment::start_time).or(cursor);
            return Err(HosError::OverlappingSegment {
                requested: timestamp,
                open_start: open_start.unwrap_or(timestamp),
            });
        }
        Ok(())
    }

    /// Validate `request` against the driver's history and build the
    /// segments it would write
    ///
    /// `calculator` holds the closed history and `open` the currently open
    /// segment. `vehicle_certified` is the DVIR gate's answer for the
    /// requested vehicle, when one was asked for. Nothing is mutated: a
    /// rejected request leaves no trace.
    pub fn plan(
        &self,
        calculator: &RollingWindowCalculator,
        open: Option<&DutyStatusSegment>,
        request: &TransitionRequest,
        vehicle_certified: Option<bool>,
    ) -> Result<TransitionPlan> {
        self.check_order(open, calculator.cursor(), request.timestamp)?;

        let closed = open.map(|segment| segment.closed_at(request.timestamp));
        let aggregates = calculator.aggregates_at(request.timestamp, closed.as_ref());

        let facts = GateFacts {
            status: request.status,
            vehicle_id: request.vehicle_id.as_ref(),
            vehicle_certified,
            aggregates: &aggregates,
        };
        check_preconditions(&facts, self.rules)?;

        let opened = DutyStatusSegment::open(
            request.driver_id.clone(),
            request.status,
            request.timestamp,
            request.vehicle_id.clone(),
        )
        .with_location(request.location.clone())
        .with_odometer(request.odometer_reading);

        Ok(TransitionPlan {
            closed,
            opened,
            aggregates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hos::entity::DutyStatus;
    use crate::hos::ids::{DriverId, VehicleId};
    use crate::hos::rules::HOUR;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn driver() -> DriverId {
        DriverId::new("drv-1")
    }

    fn drive_request(at: i64) -> TransitionRequest {
        TransitionRequest::new(driver(), DutyStatus::Driving, t(at))
            .with_vehicle(VehicleId::new("truck-1"))
    }

    #[test]
    fn test_plan_closes_open_segment_at_timestamp() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let open = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(0), None);

        let plan = machine
            .plan(&calculator, Some(&open), &drive_request(10 * HOUR), Some(true))
            .unwrap();

        let closed = plan.closed.unwrap();
        assert_eq!(closed.end_time(), Some(t(10 * HOUR)));
        assert_eq!(plan.opened.start_time(), t(10 * HOUR));
        assert!(plan.opened.is_open());
        assert_eq!(plan.opened.status(), DutyStatus::Driving);
        assert!(plan.aggregates.rest_qualified);
    }

    #[test]
    fn test_plan_rejects_earlier_timestamp() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let open = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(HOUR), None);
        let request = TransitionRequest::new(driver(), DutyStatus::OnDutyNotDriving, t(0));

        let err = machine
            .plan(&calculator, Some(&open), &request, None)
            .unwrap_err();
        assert!(matches!(err, HosError::OverlappingSegment { .. }));
    }

    #[test]
    fn test_plan_rejects_equal_timestamp() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let open = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(HOUR), None);
        let request = TransitionRequest::new(driver(), DutyStatus::SleeperBerth, t(HOUR));

        assert!(matches!(
            machine.plan(&calculator, Some(&open), &request, None),
            Err(HosError::OverlappingSegment { .. })
        ));
    }

    #[test]
    fn test_plan_resumes_history_without_open_segment_at_its_end() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let off = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(0), None);
        let (calculator, open) =
            RollingWindowCalculator::from_history(&rules, &[off.closed_at(t(HOUR))]);
        assert!(open.is_none());

        let late = TransitionRequest::new(driver(), DutyStatus::OnDutyNotDriving, t(3 * HOUR));
        let err = machine.plan(&calculator, None, &late, None).unwrap_err();
        assert!(matches!(
            err,
            HosError::OverlappingSegment { open_start, .. } if open_start == t(HOUR)
        ));

        let resumed = TransitionRequest::new(driver(), DutyStatus::OnDutyNotDriving, t(HOUR));
        let plan = machine.plan(&calculator, None, &resumed, None).unwrap();
        assert!(plan.closed.is_none());
        assert_eq!(plan.opened.start_time(), t(HOUR));
    }

    #[test]
    fn test_first_segment_for_driver_has_nothing_to_close() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let request = TransitionRequest::new(driver(), DutyStatus::OffDuty, t(0));

        let plan = machine.plan(&calculator, None, &request, None).unwrap();
        assert!(plan.closed.is_none());
        assert_eq!(plan.opened.start_time(), t(0));
    }

    #[test]
    fn test_drive_after_eight_hours_off_is_gated() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let open = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(0), None);

        let err = machine
            .plan(&calculator, Some(&open), &drive_request(8 * HOUR), Some(true))
            .unwrap_err();
        assert!(matches!(
            err,
            HosError::NoQualifyingRest { rest_secs, .. } if rest_secs == 8 * HOUR
        ));
    }

    #[test]
    fn test_gate_decision_is_idempotent() {
        let rules = RuleSet::us_federal();
        let machine = DutyStatusStateMachine::new(&rules);
        let calculator = RollingWindowCalculator::new(&rules);
        let open = DutyStatusSegment::open(driver(), DutyStatus::OffDuty, t(0), None);
        let request = drive_request(9 * HOUR);

        let first = machine.plan(&calculator, Some(&open), &request, Some(true));
        let second = machine.plan(&calculator, Some(&open), &request, Some(true));
        assert_eq!(first.unwrap_err().code(), second.unwrap_err().code());
    }
}
