//! Rule table and jurisdiction rule sets
//!
//! Limits are data, not code: a [`RuleSet`] maps each [`RuleId`] to its
//! thresholds and is selected by name from a [`RuleBook`]. The built-in
//! `us-federal` set carries the federal property-carrying defaults.
//!
//! All durations are whole seconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hos::entity::{RuleId, Severity};
use crate::hos::error::{HosError, Result};

pub const MINUTE: i64 = 60;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;

/// Length of the short cycle lookback window
pub const SEVEN_DAY_WINDOW_SECS: i64 = 7 * DAY;
/// Length of the long cycle lookback window
pub const EIGHT_DAY_WINDOW_SECS: i64 = 8 * DAY;

/// Name of the built-in rule set
pub const US_FEDERAL: &str = "us-federal";

/// How a measured value is compared to a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Fires when `measured >= threshold`
    #[default]
    AtLeast,
    /// Fires when `measured > threshold`
    Exceeds,
}

impl Comparison {
    pub fn crossed(&self, measured: i64, threshold: i64) -> bool {
        match self {
            Self::AtLeast => measured >= threshold,
            Self::Exceeds => measured > threshold,
        }
    }
}

/// Thresholds for one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLimit {
    /// Violation threshold
    pub limit_secs: i64,
    /// Optional warning threshold, below the limit
    #[serde(default)]
    pub warning_secs: Option<i64>,
    #[serde(default)]
    pub comparison: Comparison,
}

impl RuleLimit {
    pub const fn new(limit_secs: i64, warning_secs: Option<i64>, comparison: Comparison) -> Self {
        Self {
            limit_secs,
            warning_secs,
            comparison,
        }
    }

    /// Threshold for a given severity, if the rule defines one
    pub fn threshold(&self, severity: Severity) -> Option<i64> {
        match severity {
            Severity::Violation => Some(self.limit_secs),
            Severity::Warning => self.warning_secs,
        }
    }

    /// Highest severity reached by `measured`, if any
    pub fn severity_for(&self, measured: i64) -> Option<Severity> {
        [Severity::Violation, Severity::Warning]
            .into_iter()
            .find(|severity| {
                self.threshold(*severity)
                    .is_some_and(|threshold| self.comparison.crossed(measured, threshold))
            })
    }
}

/// Split sleeper-berth provision
///
/// Two rest blocks separated by duty time qualify together when one of them
/// holds at least `min_sleeper_secs` consecutive sleeper-berth time, the other
/// lasts at least `min_companion_secs`, and together they reach
/// `min_total_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSleeperRule {
    pub min_sleeper_secs: i64,
    pub min_companion_secs: i64,
    pub min_total_secs: i64,
}

impl SplitSleeperRule {
    pub const fn federal() -> Self {
        Self {
            min_sleeper_secs: 7 * HOUR,
            min_companion_secs: 2 * HOUR,
            min_total_secs: 10 * HOUR,
        }
    }
}

/// A named, jurisdiction-specific rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    /// Consecutive rest that closes a duty period
    pub qualifying_rest_secs: i64,
    /// Consecutive rest that resets the break clock
    pub min_break_secs: i64,
    #[serde(default)]
    pub split_sleeper: Option<SplitSleeperRule>,
    pub rules: BTreeMap<RuleId, RuleLimit>,
}

impl RuleSet {
    /// Federal defaults
    pub fn us_federal() -> Self {
        let rules = BTreeMap::from([
            (
                RuleId::Drive11h,
                RuleLimit::new(11 * HOUR, Some(10 * HOUR), Comparison::AtLeast),
            ),
            (
                RuleId::Duty14h,
                RuleLimit::new(14 * HOUR, Some(13 * HOUR), Comparison::AtLeast),
            ),
            (
                RuleId::Cycle60In7,
                RuleLimit::new(60 * HOUR, Some(55 * HOUR), Comparison::AtLeast),
            ),
            (
                RuleId::Cycle70In8,
                RuleLimit::new(70 * HOUR, Some(65 * HOUR), Comparison::AtLeast),
            ),
            (
                RuleId::Break30Min,
                RuleLimit::new(8 * HOUR, None, Comparison::Exceeds),
            ),
        ]);

        Self {
            name: US_FEDERAL.to_string(),
            qualifying_rest_secs: 10 * HOUR,
            min_break_secs: 30 * MINUTE,
            split_sleeper: Some(SplitSleeperRule::federal()),
            rules,
        }
    }

    pub fn limit(&self, rule: RuleId) -> Option<&RuleLimit> {
        self.rules.get(&rule)
    }

    /// Check the set is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HosError::config_error("rule set name cannot be empty"));
        }
        if self.qualifying_rest_secs <= 0 {
            return Err(HosError::config_error(format!(
                "{}: qualifying_rest_secs must be positive",
                self.name
            )));
        }
        if self.min_break_secs <= 0 {
            return Err(HosError::config_error(format!(
                "{}: min_break_secs must be positive",
                self.name
            )));
        }
        for (rule, limit) in &self.rules {
            if limit.limit_secs <= 0 {
                return Err(HosError::config_error(format!(
                    "{}: {} limit must be positive",
                    self.name, rule
                )));
            }
            if let Some(warning) = limit.warning_secs {
                if warning <= 0 || warning >= limit.limit_secs {
                    return Err(HosError::config_error(format!(
                        "{}: {} warning ({}s) must be positive and below the limit ({}s)",
                        self.name, rule, warning, limit.limit_secs
                    )));
                }
            }
        }
        if let Some(split) = &self.split_sleeper {
            if split.min_sleeper_secs <= 0
                || split.min_companion_secs <= 0
                || split.min_total_secs < split.min_sleeper_secs + split.min_companion_secs
            {
                return Err(HosError::config_error(format!(
                    "{}: split sleeper durations are inconsistent",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::us_federal()
    }
}

/// Collection of named rule sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBook {
    sets: BTreeMap<String, RuleSet>,
}

impl RuleBook {
    /// A book holding only the built-in federal set
    pub fn builtin() -> Self {
        let federal = RuleSet::us_federal();
        Self {
            sets: BTreeMap::from([(federal.name.clone(), federal)]),
        }
    }

    /// Add or replace rule sets from a JSON array of [`RuleSet`]s
    ///
    /// Every set is validated before any is inserted.
    pub fn merge_json(&mut self, json: &str) -> Result<usize> {
        let sets: Vec<RuleSet> = serde_json::from_str(json)
            .map_err(|e| HosError::config_error(format!("invalid rule set file: {}", e)))?;
        for set in &sets {
            set.validate()?;
        }
        let count = sets.len();
        for set in sets {
            self.sets.insert(set.name.clone(), set);
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Result<&RuleSet> {
        self.sets
            .get(name)
            .ok_or_else(|| HosError::config_error(format!("unknown rule set '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federal_defaults() {
        let set = RuleSet::us_federal();
        set.validate().unwrap();

        let drive = set.limit(RuleId::Drive11h).unwrap();
        assert_eq!(drive.limit_secs, 11 * HOUR);
        assert_eq!(drive.warning_secs, Some(10 * HOUR));
        assert_eq!(set.rules.len(), 5);
    }

    #[test]
    fn test_severity_for_thresholds() {
        let drive = RuleSet::us_federal().rules[&RuleId::Drive11h];

        assert_eq!(drive.severity_for(10 * HOUR - 1), None);
        assert_eq!(drive.severity_for(10 * HOUR), Some(Severity::Warning));
        assert_eq!(drive.severity_for(11 * HOUR), Some(Severity::Violation));
    }

    #[test]
    fn test_break_rule_fires_only_once_exceeded() {
        let brk = RuleSet::us_federal().rules[&RuleId::Break30Min];

        assert_eq!(brk.severity_for(8 * HOUR), None);
        assert_eq!(brk.severity_for(8 * HOUR + 1), Some(Severity::Violation));
        assert_eq!(brk.threshold(Severity::Warning), None);
    }

    #[test]
    fn test_merge_json_adds_named_set() {
        let json = r#"[{
            "name": "ca-south",
            "qualifying_rest_secs": 28800,
            "min_break_secs": 1800,
            "rules": {
                "DRIVE_11H": { "limit_secs": 46800, "warning_secs": 43200 },
                "CYCLE_70_8": { "limit_secs": 252000 }
            }
        }]"#;

        let mut book = RuleBook::builtin();
        assert_eq!(book.merge_json(json).unwrap(), 1);

        let set = book.get("ca-south").unwrap();
        assert_eq!(set.split_sleeper, None);
        assert_eq!(set.rules[&RuleId::Drive11h].limit_secs, 13 * HOUR);
        assert_eq!(set.rules[&RuleId::Drive11h].comparison, Comparison::AtLeast);
        assert!(book.get(US_FEDERAL).is_ok());
        assert_eq!(book.names().count(), 2);
    }

    #[test]
    fn test_merge_json_rejects_warning_above_limit() {
        let json = r#"[{
            "name": "broken",
            "qualifying_rest_secs": 36000,
            "min_break_secs": 1800,
            "rules": { "DUTY_14H": { "limit_secs": 3600, "warning_secs": 7200 } }
        }]"#;

        let mut book = RuleBook::builtin();
        let err = book.merge_json(json).unwrap_err();
        assert!(matches!(err, HosError::ConfigError(_)));
        assert!(book.get("broken").is_err());
    }

    #[test]
    fn test_unknown_rule_set() {
        let book = RuleBook::builtin();
        assert!(matches!(
            book.get("mars-colony"),
            Err(HosError::ConfigError(_))
        ));
    }
}
