//! Hours-of-Service compliance engine
//!
//! This module contains the duty-status model, the rule table, the rolling
//! window calculator, the violation detector and the state machine that
//! gates transitions, plus the service that runs them against the ports.

mod detector;
mod entity;
mod error;
mod gate;
mod ids;
mod locks;
mod rules;
mod service;
mod state_machine;
mod window;

pub use detector::{sort_findings, ViolationDetector};
pub use entity::{
    DutyStatus, DutyStatusSegment, DvirReport, RuleId, SegmentCorrection, Severity,
    TransitionOutcome, TransitionRequest, Violation, ViolationFinding,
};
pub use error::{ErrorCategory, HosError, Result};
pub use gate::{check_preconditions, checklist_for, GateFacts, Precondition, DRIVING_CHECKLIST};
pub use ids::{DriverId, VehicleId, ViolationId};
pub use locks::DriverLocks;
pub use rules::{
    Comparison, RuleBook, RuleLimit, RuleSet, SplitSleeperRule, DAY, EIGHT_DAY_WINDOW_SECS, HOUR,
    MINUTE, SEVEN_DAY_WINDOW_SECS, US_FEDERAL,
};
pub use service::{
    CorrectionOutcome, DriverStanding, HosConfig, HosService, RecomputePolicy, RecomputeReport,
};
pub use state_machine::{DutyStatusStateMachine, TransitionPlan};
pub use window::{RollingWindowCalculator, WindowAggregates};
