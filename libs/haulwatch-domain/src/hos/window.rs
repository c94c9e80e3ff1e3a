//! Rolling-window aggregation over a driver's duty-status log
//!
//! [`RollingWindowCalculator`] is fed closed segments in order and keeps two
//! pieces of state:
//!
//! - a small, copyable duty-period tracker (current period start, driving
//!   time, break clock, the rest block in progress and the last rest block
//!   eligible for split-sleeper pairing);
//! - an arena of on-duty intervals from the trailing eight days together with
//!   their running sum. Intervals that fall out of the eight-day window are
//!   evicted as new segments arrive, so each push and query costs at most the
//!   number of intervals in the window, regardless of how long the history is.
//!
//! Queries take an optional *tail*: the segment that begins where the pushed
//! history ends (usually the open segment). The tail is applied to a copy of
//! the tracker, so the calculator can be queried at any instant inside the
//! tail without being mutated.
//!
//! All arithmetic is in whole seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::hos::entity::{DutyStatus, DutyStatusSegment, RuleId};
use crate::hos::rules::{
    RuleSet, SplitSleeperRule, EIGHT_DAY_WINDOW_SECS, SEVEN_DAY_WINDOW_SECS,
};

/// Convert whole unix seconds back to a timestamp
pub(crate) fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Everything the rule table is evaluated against, for one driver at one
/// instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAggregates {
    pub as_of: DateTime<Utc>,
    /// Start of the current duty period, `None` while in a qualifying rest
    pub duty_period_start: Option<DateTime<Utc>>,
    /// Whether the current duty period followed a qualifying rest
    pub period_follows_qualifying_rest: bool,
    /// Driving time in the current duty period
    pub driving_secs: i64,
    /// Wall-clock time since the current duty period started
    pub duty_elapsed_secs: i64,
    /// Driving + on-duty time over the trailing 7×24h
    pub seven_day_duty_secs: i64,
    /// Driving + on-duty time over the trailing 8×24h
    pub eight_day_duty_secs: i64,
    /// Driving time since the last 30-minute break or period start
    pub driving_since_break_secs: i64,
    /// When the break clock last restarted
    pub break_window_start: Option<DateTime<Utc>>,
    /// Length of the rest block in progress (0 while on duty)
    pub current_rest_secs: i64,
    /// Whether the rest block in progress already qualifies
    pub rest_qualified: bool,
}

impl WindowAggregates {
    /// The value a rule is measured against
    pub fn measured(&self, rule: RuleId) -> i64 {
        match rule {
            RuleId::Drive11h => self.driving_secs,
            RuleId::Duty14h => self.duty_elapsed_secs,
            RuleId::Cycle60In7 => self.seven_day_duty_secs,
            RuleId::Cycle70In8 => self.eight_day_duty_secs,
            RuleId::Break30Min => self.driving_since_break_secs,
        }
    }

    /// Start of the window a rule is measured over
    pub fn window_start(&self, rule: RuleId) -> DateTime<Utc> {
        let as_of = self.as_of.timestamp();
        match rule {
            RuleId::Drive11h | RuleId::Duty14h => self.duty_period_start.unwrap_or(self.as_of),
            RuleId::Break30Min => self
                .break_window_start
                .or(self.duty_period_start)
                .unwrap_or(self.as_of),
            RuleId::Cycle60In7 => from_secs(as_of - SEVEN_DAY_WINDOW_SECS),
            RuleId::Cycle70In8 => from_secs(as_of - EIGHT_DAY_WINDOW_SECS),
        }
    }
}

/// Thresholds the tracker needs, lifted out of the rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RestPolicy {
    qualifying_rest_secs: i64,
    min_break_secs: i64,
    split_sleeper: Option<SplitSleeperRule>,
}

impl From<&RuleSet> for RestPolicy {
    fn from(rules: &RuleSet) -> Self {
        Self {
            qualifying_rest_secs: rules.qualifying_rest_secs,
            min_break_secs: rules.min_break_secs,
            split_sleeper: rules.split_sleeper,
        }
    }
}

/// A run of contiguous off-duty / sleeper-berth time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RestBlock {
    len: i64,
    sleeper_run: i64,
    longest_sleeper: i64,
    qualified: bool,
}

impl RestBlock {
    const EMPTY: Self = Self {
        len: 0,
        sleeper_run: 0,
        longest_sleeper: 0,
        qualified: false,
    };

    fn extend(&mut self, status: DutyStatus, secs: i64) {
        self.len += secs;
        if status == DutyStatus::SleeperBerth {
            self.sleeper_run += secs;
            self.longest_sleeper = self.longest_sleeper.max(self.sleeper_run);
        } else {
            self.sleeper_run = 0;
        }
    }
}

fn split_pair_qualifies(rule: &SplitSleeperRule, earlier: &RestBlock, later: &RestBlock) -> bool {
    let sleeper_then_companion = earlier.longest_sleeper >= rule.min_sleeper_secs
        && later.len >= rule.min_companion_secs;
    let companion_then_sleeper = later.longest_sleeper >= rule.min_sleeper_secs
        && earlier.len >= rule.min_companion_secs;

    (sleeper_then_companion || companion_then_sleeper)
        && earlier.len + later.len >= rule.min_total_secs
}

/// Duty-period bookkeeping; `Copy` so queries can run on a scratch copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodTracker {
    period_start: Option<i64>,
    opened_by_rest: bool,
    after_qualifying_rest: bool,
    driving: i64,
    since_break: i64,
    break_anchor: Option<i64>,
    break_pending: bool,
    rest: Option<RestBlock>,
    split_candidate: Option<RestBlock>,
}

impl PeriodTracker {
    const START: Self = Self {
        period_start: None,
        opened_by_rest: false,
        after_qualifying_rest: false,
        driving: 0,
        since_break: 0,
        break_anchor: None,
        break_pending: false,
        rest: None,
        split_candidate: None,
    };

    fn advance(&mut self, policy: &RestPolicy, status: DutyStatus, start: i64, end: i64) {
        let secs = (end - start).max(0);

        if status.is_rest() {
            let block = self.rest.get_or_insert(RestBlock::EMPTY);
            block.extend(status, secs);
            let block = *block;

            if block.len >= policy.min_break_secs {
                self.since_break = 0;
                self.break_pending = true;
            }

            if !block.qualified && self.rest_qualifies(policy, &block) {
                if let Some(rest) = self.rest.as_mut() {
                    rest.qualified = true;
                }
                self.close_period();
            }
            return;
        }

        if let Some(block) = self.rest.take() {
            let eligible = policy
                .split_sleeper
                .is_some_and(|split| block.len >= split.min_companion_secs);
            if !block.qualified && eligible {
                self.split_candidate = Some(block);
            }
        }

        if self.period_start.is_none() {
            self.period_start = Some(start);
            self.opened_by_rest = self.after_qualifying_rest;
            self.break_anchor = Some(start);
            self.break_pending = false;
        } else if self.break_pending {
            self.break_anchor = Some(start);
            self.break_pending = false;
        }

        if status == DutyStatus::Driving {
            self.driving += secs;
            self.since_break += secs;
        }
    }

    fn rest_qualifies(&self, policy: &RestPolicy, block: &RestBlock) -> bool {
        if block.len >= policy.qualifying_rest_secs {
            return true;
        }
        match (&policy.split_sleeper, &self.split_candidate) {
            (Some(rule), Some(earlier)) => split_pair_qualifies(rule, earlier, block),
            _ => false,
        }
    }

    fn close_period(&mut self) {
        self.period_start = None;
        self.opened_by_rest = false;
        self.after_qualifying_rest = true;
        self.driving = 0;
        self.since_break = 0;
        self.break_anchor = None;
        self.break_pending = false;
        self.split_candidate = None;
    }
}

/// A closed interval of on-duty time `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DutyInterval {
    start: i64,
    end: i64,
}

impl DutyInterval {
    fn len(&self) -> i64 {
        self.end - self.start
    }
}

/// Sliding-window accumulator for one driver
#[derive(Debug, Clone)]
pub struct RollingWindowCalculator {
    policy: RestPolicy,
    tracker: PeriodTracker,
    duty: VecDeque<DutyInterval>,
    duty_total: i64,
    cursor: Option<i64>,
}

impl RollingWindowCalculator {
    pub fn new(rules: &RuleSet) -> Self {
        Self {
            policy: RestPolicy::from(rules),
            tracker: PeriodTracker::START,
            duty: VecDeque::new(),
            duty_total: 0,
            cursor: None,
        }
    }

    /// Build a calculator from an ordered history
    ///
    /// Closed segments are pushed; the open segment, if any, is returned so
    /// it can be supplied as the tail of later queries.
    pub fn from_history<'a, I>(rules: &RuleSet, segments: I) -> (Self, Option<DutyStatusSegment>)
    where
        I: IntoIterator<Item = &'a DutyStatusSegment>,
    {
        let mut calculator = Self::new(rules);
        let mut open = None;
        for segment in segments {
            if segment.is_open() {
                open = Some(segment.clone());
            } else {
                calculator.push(segment);
            }
        }
        (calculator, open)
    }

    /// End of the last pushed segment
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor.map(from_secs)
    }

    /// Number of on-duty intervals currently held in the arena
    pub fn arena_len(&self) -> usize {
        self.duty.len()
    }

    /// Append a closed segment to the history
    ///
    /// Open segments are ignored; pass them as the tail of a query instead.
    pub fn push(&mut self, segment: &DutyStatusSegment) {
        let Some(end) = segment.end_time() else {
            return;
        };
        let start = segment.start_secs();
        let end = end.timestamp();

        self.tracker
            .advance(&self.policy, segment.status(), start, end);

        if segment.status().is_on_duty() && end > start {
            match self.duty.back_mut() {
                Some(last) if last.end == start => last.end = end,
                _ => self.duty.push_back(DutyInterval { start, end }),
            }
            self.duty_total += end - start;
        }

        self.cursor = Some(self.cursor.map_or(end, |cursor| cursor.max(end)));
        self.evict(end);
    }

    fn evict(&mut self, now: i64) {
        let horizon = now - EIGHT_DAY_WINDOW_SECS;
        while let Some(front) = self.duty.front() {
            if front.end > horizon {
                break;
            }
            self.duty_total -= front.len();
            self.duty.pop_front();
        }
    }

    /// On-duty seconds from the arena inside `[as_of - window, as_of]`
    fn arena_sum(&self, as_of: i64, window: i64) -> i64 {
        let horizon = as_of - window;
        let mut sum = self.duty_total;
        for interval in &self.duty {
            if interval.start >= horizon {
                break;
            }
            sum -= interval.end.min(horizon) - interval.start;
        }
        sum
    }

    /// Aggregates at `as_of`
    ///
    /// `tail` is the segment that starts where the pushed history ends; it is
    /// counted up to `as_of` (or its own end, whichever comes first). `as_of`
    /// must not precede the end of the pushed history.
    pub fn aggregates_at(
        &self,
        as_of: DateTime<Utc>,
        tail: Option<&DutyStatusSegment>,
    ) -> WindowAggregates {
        let t = as_of.timestamp();
        debug_assert!(self.cursor.map_or(true, |cursor| cursor <= t));

        let mut tracker = self.tracker;
        let mut seven = self.arena_sum(t, SEVEN_DAY_WINDOW_SECS);
        let mut eight = self.arena_sum(t, EIGHT_DAY_WINDOW_SECS);

        if let Some(segment) = tail {
            let start = self
                .cursor
                .map_or(segment.start_secs(), |cursor| cursor.max(segment.start_secs()));
            let end = segment.end_secs_or(t).min(t);
            if end > start {
                tracker.advance(&self.policy, segment.status(), start, end);
                if segment.status().is_on_duty() {
                    seven += (end - start.max(t - SEVEN_DAY_WINDOW_SECS)).max(0);
                    eight += (end - start.max(t - EIGHT_DAY_WINDOW_SECS)).max(0);
                }
            }
        }

        WindowAggregates {
            as_of: from_secs(t),
            duty_period_start: tracker.period_start.map(from_secs),
            period_follows_qualifying_rest: tracker.opened_by_rest,
            driving_secs: tracker.driving,
            duty_elapsed_secs: tracker.period_start.map_or(0, |start| t - start),
            seven_day_duty_secs: seven.max(0),
            eight_day_duty_secs: eight.max(0),
            driving_since_break_secs: tracker.since_break,
            break_window_start: tracker.break_anchor.map(from_secs),
            current_rest_secs: tracker.rest.map_or(0, |rest| rest.len),
            rest_qualified: tracker.rest.is_some_and(|rest| rest.qualified),
        }
    }
}
