//! Violation detection against the active rule set
//!
//! Rules are independent: each is evaluated against the same aggregates and
//! the results are sorted, so evaluation order never changes the outcome.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;

use crate::hos::entity::{DutyStatusSegment, RuleId, Severity, Violation};
use crate::hos::ids::{DriverId, ViolationId};
use crate::hos::rules::{RuleLimit, RuleSet};
use crate::hos::window::{from_secs, RollingWindowCalculator, WindowAggregates};

/// Compares window aggregates to a rule table and emits findings
#[derive(Debug, Clone)]
pub struct ViolationDetector {
    rules: RuleSet,
}

impl ViolationDetector {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Findings implied by a single snapshot
    ///
    /// Every threshold the snapshot is at or past is reported, with
    /// `detected_at` set to the snapshot instant. Nothing is deduplicated;
    /// this is the read-side view of "where does the driver stand now".
    pub fn evaluate(&self, driver_id: &DriverId, aggregates: &WindowAggregates) -> Vec<Violation> {
        let mut findings = Vec::new();
        for (rule, limit) in &self.rules.rules {
            let measured = aggregates.measured(*rule);
            let Some(severity) = limit.severity_for(measured) else {
                continue;
            };
            findings.push(Violation {
                id: ViolationId::new(),
                driver_id: driver_id.clone(),
                rule_id: *rule,
                severity,
                detected_at: aggregates.as_of,
                window_start: aggregates.window_start(*rule),
                window_end: aggregates.as_of,
                measured_secs: measured,
                limit_secs: limit.threshold(severity).unwrap_or(limit.limit_secs),
                supersedes: None,
            });
        }
        sort_findings(&mut findings);
        findings
    }

    /// Threshold crossings inside a just-closed segment
    ///
    /// `calculator` holds the history up to the start of `closed`. For each
    /// rule and severity the measured value is compared at both ends of the
    /// segment, or of its part before a qualifying rest closes the period; a finding is emitted only when the value starts below the
    /// threshold and ends at or past it. `detected_at` is the exact second of
    /// the crossing. A rule/severity pair that already fired in the current
    /// duty period (per `prior`) is not emitted again.
    pub fn detect_crossings(
        &self,
        calculator: &RollingWindowCalculator,
        closed: &DutyStatusSegment,
        prior: &[Violation],
    ) -> Vec<Violation> {
        let Some(end_time) = closed.end_time() else {
            return Vec::new();
        };
        let lo = closed.start_secs();
        let hi = end_time.timestamp();
        if hi <= lo {
            return Vec::new();
        }

        let measure_at = |secs: i64| calculator.aggregates_at(from_secs(secs), Some(closed));
        let qualified = |secs: i64| measure_at(secs).rest_qualified;

        // A rest that qualifies closes the duty period and zeroes its clocks;
        // only the stretch before that second is searched.
        let hi = if closed.status().is_rest() && qualified(hi) {
            if qualified(lo) {
                return Vec::new();
            }
            first_crossing(lo, hi, qualified) - 1
        } else {
            hi
        };
        if hi <= lo {
            return Vec::new();
        }

        let at_start = measure_at(lo);
        let at_end = measure_at(hi);

        let mut findings: Vec<Violation> = Vec::new();
        for (rule, limit) in &self.rules.rules {
            for severity in [Severity::Violation, Severity::Warning] {
                let Some(threshold) = limit.threshold(severity) else {
                    continue;
                };
                if limit.comparison.crossed(at_start.measured(*rule), threshold)
                    || !limit.comparison.crossed(at_end.measured(*rule), threshold)
                {
                    continue;
                }

                let crossing = first_crossing(lo, hi, |secs| {
                    limit
                        .comparison
                        .crossed(measure_at(secs).measured(*rule), threshold)
                });
                let period_start = measure_at(crossing)
                    .duty_period_start
                    .unwrap_or_else(|| from_secs(crossing));

                if already_fired(prior, *rule, severity, period_start)
                    || already_fired(&findings, *rule, severity, period_start)
                {
                    continue;
                }

                findings.push(self.finding(
                    closed.driver_id(),
                    *rule,
                    severity,
                    limit,
                    from_secs(crossing),
                    &at_end,
                ));
            }
        }

        sort_findings(&mut findings);
        findings
    }

    fn finding(
        &self,
        driver_id: &DriverId,
        rule: RuleId,
        severity: Severity,
        limit: &RuleLimit,
        detected_at: DateTime<Utc>,
        at_end: &WindowAggregates,
    ) -> Violation {
        Violation {
            id: ViolationId::new(),
            driver_id: driver_id.clone(),
            rule_id: rule,
            severity,
            detected_at,
            window_start: at_end.window_start(rule),
            window_end: at_end.as_of,
            measured_secs: at_end.measured(rule),
            limit_secs: limit.threshold(severity).unwrap_or(limit.limit_secs),
            supersedes: None,
        }
    }
}

/// Earliest second in `(lo, hi]` where `crossed` holds
///
/// `crossed(lo)` is false and `crossed(hi)` is true; the measured value is
/// monotone within a single segment, so a binary search is exact.
fn first_crossing(mut lo: i64, mut hi: i64, crossed: impl Fn(i64) -> bool) -> i64 {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if crossed(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

fn already_fired(
    violations: &[Violation],
    rule: RuleId,
    severity: Severity,
    period_start: DateTime<Utc>,
) -> bool {
    violations.iter().any(|v| {
        v.rule_id == rule && v.severity == severity && v.detected_at >= period_start
    })
}

/// Most severe first, ties by rule id
pub fn sort_findings(findings: &mut [Violation]) {
    findings.sort_by(|a, b| {
        (Reverse(a.severity), a.rule_id.as_str(), a.detected_at).cmp(&(
            Reverse(b.severity),
            b.rule_id.as_str(),
            b.detected_at,
        ))
    });
}
