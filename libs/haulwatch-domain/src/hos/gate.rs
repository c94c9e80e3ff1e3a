//! Preconditions for entering `driving`
//!
//! Each precondition is an independent predicate over [`GateFacts`] that
//! returns a typed rejection. The checklist is evaluated in order and stops
//! at the first failure, before anything is written.

use crate::hos::entity::DutyStatus;
use crate::hos::error::{HosError, Result};
use crate::hos::ids::VehicleId;
use crate::hos::rules::RuleSet;
use crate::hos::window::WindowAggregates;

/// Everything the checklist looks at, gathered before evaluation
#[derive(Debug, Clone, Copy)]
pub struct GateFacts<'a> {
    pub status: DutyStatus,
    pub vehicle_id: Option<&'a VehicleId>,
    /// Answer of the DVIR gate, `None` when it was not consulted
    pub vehicle_certified: Option<bool>,
    /// Aggregates at the transition instant, open segment included
    pub aggregates: &'a WindowAggregates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// A driving segment references a vehicle
    VehicleAssigned,
    /// The vehicle has a cleared inspection report
    VehicleCertified,
    /// The current duty period was opened by a qualifying rest, or the driver
    /// is in one now
    QualifyingRest,
}

/// Checklist applied to transitions into `driving`
///
/// The DVIR check runs before the rest check so an uncertified vehicle is
/// reported regardless of rest state.
pub const DRIVING_CHECKLIST: [Precondition; 3] = [
    Precondition::VehicleAssigned,
    Precondition::VehicleCertified,
    Precondition::QualifyingRest,
];

impl Precondition {
    pub fn check(&self, facts: &GateFacts<'_>, rules: &RuleSet) -> Result<()> {
        match self {
            Self::VehicleAssigned => match facts.vehicle_id {
                Some(_) => Ok(()),
                None => Err(HosError::VehicleRequired),
            },
            Self::VehicleCertified => match (facts.vehicle_id, facts.vehicle_certified) {
                (Some(_), Some(true)) => Ok(()),
                (Some(vehicle_id), _) => Err(HosError::vehicle_not_certified(vehicle_id.as_str())),
                (None, _) => Err(HosError::VehicleRequired),
            },
            Self::QualifyingRest => {
                let agg = facts.aggregates;
                let in_period_after_rest =
                    agg.duty_period_start.is_some() && agg.period_follows_qualifying_rest;
                if agg.rest_qualified || in_period_after_rest {
                    Ok(())
                } else {
                    Err(HosError::no_qualifying_rest(
                        agg.current_rest_secs,
                        rules.qualifying_rest_secs,
                    ))
                }
            }
        }
    }
}

/// Preconditions that apply to a transition into `status`
pub fn checklist_for(status: DutyStatus) -> &'static [Precondition] {
    match status {
        DutyStatus::Driving => &DRIVING_CHECKLIST,
        _ => &[],
    }
}

/// Evaluate the checklist for `facts.status`, stopping at the first failure
pub fn check_preconditions(facts: &GateFacts<'_>, rules: &RuleSet) -> Result<()> {
    checklist_for(facts.status)
        .iter()
        .try_for_each(|precondition| precondition.check(facts, rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hos::rules::HOUR;
    use chrono::{TimeZone, Utc};

    fn aggregates(rest_secs: i64, rest_qualified: bool, in_period: bool) -> WindowAggregates {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        WindowAggregates {
            as_of: now,
            duty_period_start: in_period.then_some(now),
            period_follows_qualifying_rest: in_period,
            driving_secs: 0,
            duty_elapsed_secs: 0,
            seven_day_duty_secs: 0,
            eight_day_duty_secs: 0,
            driving_since_break_secs: 0,
            break_window_start: None,
            current_rest_secs: rest_secs,
            rest_qualified,
        }
    }

    #[test]
    fn test_driving_after_qualifying_rest_passes() {
        let rules = RuleSet::us_federal();
        let vehicle = VehicleId::new("truck-1");
        let agg = aggregates(10 * HOUR, true, false);
        let facts = GateFacts {
            status: DutyStatus::Driving,
            vehicle_id: Some(&vehicle),
            vehicle_certified: Some(true),
            aggregates: &agg,
        };

        assert!(check_preconditions(&facts, &rules).is_ok());
    }

    #[test]
    fn test_short_rest_rejected() {
        let rules = RuleSet::us_federal();
        let vehicle = VehicleId::new("truck-1");
        let agg = aggregates(8 * HOUR, false, false);
        let facts = GateFacts {
            status: DutyStatus::Driving,
            vehicle_id: Some(&vehicle),
            vehicle_certified: Some(true),
            aggregates: &agg,
        };

        let err = check_preconditions(&facts, &rules).unwrap_err();
        assert!(matches!(
            err,
            HosError::NoQualifyingRest {
                rest_secs,
                required_secs
            } if rest_secs == 8 * HOUR && required_secs == 10 * HOUR
        ));
    }

    #[test]
    fn test_uncertified_vehicle_reported_before_rest() {
        let rules = RuleSet::us_federal();
        let vehicle = VehicleId::new("truck-1");
        let agg = aggregates(HOUR, false, false);
        let facts = GateFacts {
            status: DutyStatus::Driving,
            vehicle_id: Some(&vehicle),
            vehicle_certified: Some(false),
            aggregates: &agg,
        };

        let err = check_preconditions(&facts, &rules).unwrap_err();
        assert!(matches!(err, HosError::VehicleNotCertified(_)));
    }

    #[test]
    fn test_mid_period_drive_passes() {
        let rules = RuleSet::us_federal();
        let vehicle = VehicleId::new("truck-1");
        let agg = aggregates(0, false, true);
        let facts = GateFacts {
            status: DutyStatus::Driving,
            vehicle_id: Some(&vehicle),
            vehicle_certified: Some(true),
            aggregates: &agg,
        };

        assert!(check_preconditions(&facts, &rules).is_ok());
    }

    #[test]
    fn test_non_driving_statuses_are_ungated() {
        let rules = RuleSet::us_federal();
        let agg = aggregates(0, false, false);
        for status in [
            DutyStatus::OffDuty,
            DutyStatus::SleeperBerth,
            DutyStatus::OnDutyNotDriving,
        ] {
            let facts = GateFacts {
                status,
                vehicle_id: None,
                vehicle_certified: None,
                aggregates: &agg,
            };
            assert!(check_preconditions(&facts, &rules).is_ok());
        }
    }

    #[test]
    fn test_driving_requires_vehicle() {
        let rules = RuleSet::us_federal();
        let agg = aggregates(10 * HOUR, true, false);
        let facts = GateFacts {
            status: DutyStatus::Driving,
            vehicle_id: None,
            vehicle_certified: None,
            aggregates: &agg,
        };

        assert!(matches!(
            check_preconditions(&facts, &rules),
            Err(HosError::VehicleRequired)
        ));
    }
}
