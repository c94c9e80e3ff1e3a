//! HOS service - business logic orchestration
//!
//! The service ties the engine to its collaborators. A transition runs
//! entirely under the driver's lock: read the open segment, validate,
//! close/open, detect crossings and commit everything to the log store in one
//! call. Nothing is cached or returned until the store accepts the write.
//!
//! Per driver, the service keeps a ledger (rolling-window accumulator, open
//! segment, recent findings) behind the lock, so the hot path never rescans
//! the full history. Queries and maintenance always read from the store.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::hos::detector::{sort_findings, ViolationDetector};
use crate::hos::entity::{
    DutyStatus, DutyStatusSegment, SegmentCorrection, TransitionOutcome, TransitionRequest,
    Violation,
};
use crate::hos::error::{HosError, Result};
use crate::hos::ids::{DriverId, ViolationId};
use crate::hos::locks::DriverLocks;
use crate::hos::rules::{RuleSet, DAY};
use crate::hos::state_machine::DutyStatusStateMachine;
use crate::hos::window::{from_secs, RollingWindowCalculator, WindowAggregates};
use crate::ports::{Clock, DutyLogStore, SystemClock, TransitionCommit, VehicleInspectionGate};

/// Which findings a recompute may rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputePolicy {
    /// Replay and reconcile the whole history
    #[default]
    Retroactive,
    /// Replay the whole history but only reconcile findings detected at or
    /// after the correction point
    Prospective,
}

impl RecomputePolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Retroactive => "retroactive",
            Self::Prospective => "prospective",
        }
    }
}

impl fmt::Display for RecomputePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecomputePolicy {
    type Err = HosError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retroactive" => Ok(Self::Retroactive),
            "prospective" => Ok(Self::Prospective),
            other => Err(HosError::config_error(format!(
                "unknown recompute policy '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the HOS service
#[derive(Debug, Clone)]
pub struct HosConfig {
    /// How long a request waits for the driver's lock (default: 2s)
    pub lock_timeout: Duration,
    /// History loaded to seed a driver's ledger and answer queries
    /// (default: 10 days, covering the 8-day cycle window)
    pub history_lookback: Duration,
    pub recompute_policy: RecomputePolicy,
}

impl Default for HosConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            history_lookback: Duration::from_secs(10 * DAY as u64),
            recompute_policy: RecomputePolicy::default(),
        }
    }
}

/// Where a driver stands at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverStanding {
    pub driver_id: DriverId,
    pub rule_set: String,
    pub aggregates: WindowAggregates,
    /// Every threshold the aggregates are at or past, most severe first
    pub findings: Vec<Violation>,
}

/// Result of replaying a driver's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeReport {
    pub driver_id: DriverId,
    pub policy: RecomputePolicy,
    /// Correction point, when the policy limits reconciliation
    pub from: Option<DateTime<Utc>>,
    pub replayed_segments: usize,
    /// Stored findings reproduced exactly
    pub unchanged: usize,
    /// Records written by the recompute, superseding ones included
    pub added: Vec<Violation>,
    /// Stored records replaced by a record in `added`
    pub superseded: Vec<ViolationId>,
    /// Stored records the replay no longer produces
    pub stale: Vec<ViolationId>,
}

/// A stored correction and the recompute it triggered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    pub segment: DutyStatusSegment,
    pub recompute: RecomputeReport,
}

/// Cached per-driver state, only touched while the driver's lock is held
#[derive(Debug, Clone)]
struct DriverLedger {
    calculator: RollingWindowCalculator,
    open: Option<DutyStatusSegment>,
    /// Effective findings recent enough to matter for deduplication
    recent: Vec<Violation>,
}

/// Service enforcing Hours-of-Service rules for a fleet
///
/// Generic over the log store, the DVIR gate and the clock; every
/// collaborator is statically dispatched.
pub struct HosService<L, G, C = SystemClock> {
    store: L,
    gate: G,
    clock: C,
    detector: ViolationDetector,
    config: HosConfig,
    ledgers: DriverLocks<Option<DriverLedger>>,
    maintenance: AsyncMutex<()>,
}

impl<L, G> HosService<L, G, SystemClock>
where
    L: DutyLogStore,
    G: VehicleInspectionGate,
{
    /// Create a new HosService on wall-clock time
    pub fn new(store: L, gate: G, rules: RuleSet, config: HosConfig) -> Self {
        Self::with_clock(store, gate, SystemClock, rules, config)
    }
}

impl<L, G, C> HosService<L, G, C>
where
    L: DutyLogStore,
    G: VehicleInspectionGate,
    C: Clock,
{
    pub fn with_clock(store: L, gate: G, clock: C, rules: RuleSet, config: HosConfig) -> Self {
        Self {
            store,
            gate,
            clock,
            detector: ViolationDetector::new(rules),
            ledgers: DriverLocks::new(config.lock_timeout),
            config,
            maintenance: AsyncMutex::new(()),
        }
    }

    /// The active rule set
    pub fn rules(&self) -> &RuleSet {
        self.detector.rules()
    }

    pub fn config(&self) -> &HosConfig {
        &self.config
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    /// Apply a duty-status change
    ///
    /// Closes the open segment at `request.timestamp`, opens the new one and
    /// returns it with the findings the closed segment produced. Timestamps
    /// are truncated to whole seconds.
    ///
    /// # Errors
    ///
    /// - `HosError::OverlappingSegment` if the timestamp does not follow the
    ///   open segment's start
    /// - `HosError::VehicleRequired`, `HosError::VehicleNotCertified` and
    ///   `HosError::NoQualifyingRest` for a gated entry into `driving`
    /// - `HosError::UnknownDriver` if the store does not know the driver
    /// - `HosError::LockTimeout` if another request holds the driver too long
    /// - `HosError::StorageFailure` / `HosError::GateFailure` from collaborators
    pub async fn transition(&self, mut request: TransitionRequest) -> Result<TransitionOutcome> {
        request.timestamp = request.timestamp.trunc_subsecs(0);

        let result = self.transition_locked(&request).await;
        match &result {
            Ok(outcome) => info!(
                driver_id = %request.driver_id,
                status = %request.status,
                timestamp = %request.timestamp,
                violations = outcome.violations.len(),
                "Duty-status transition committed"
            ),
            Err(err) => warn!(
                driver_id = %request.driver_id,
                status = %request.status,
                timestamp = %request.timestamp,
                code = err.code(),
                error = %err,
                "Duty-status transition rejected"
            ),
        }
        result
    }

    async fn transition_locked(&self, request: &TransitionRequest) -> Result<TransitionOutcome> {
        let mut slot = self.ledgers.acquire(&request.driver_id).await?;
        let mut ledger = match slot.take() {
            Some(ledger) => ledger,
            None => self.load_ledger(&request.driver_id, request.timestamp).await?,
        };

        let result = self.apply(&mut ledger, request).await;
        // A failed store call may have written part of the commit, and an
        // overlap may come from the store's own check; either way the next
        // request reloads from the store instead of trusting the cache.
        if !matches!(
            result,
            Err(HosError::StorageFailure(_) | HosError::OverlappingSegment { .. })
        ) {
            *slot = Some(ledger);
        }
        result
    }

    async fn apply(
        &self,
        ledger: &mut DriverLedger,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome> {
        let machine = DutyStatusStateMachine::new(self.rules());
        machine.check_order(
            ledger.open.as_ref(),
            ledger.calculator.cursor(),
            request.timestamp,
        )?;

        let vehicle_certified = match (request.status, &request.vehicle_id) {
            (DutyStatus::Driving, Some(vehicle_id)) => Some(
                self.gate
                    .is_vehicle_certified(vehicle_id, request.timestamp)
                    .await?,
            ),
            _ => None,
        };

        let plan = machine.plan(
            &ledger.calculator,
            ledger.open.as_ref(),
            request,
            vehicle_certified,
        )?;

        let violations = match &plan.closed {
            Some(closed) => {
                self.detector
                    .detect_crossings(&ledger.calculator, closed, &ledger.recent)
            }
            None => Vec::new(),
        };

        let commit = TransitionCommit {
            driver_id: request.driver_id.clone(),
            closed: plan.closed,
            opened: plan.opened,
            violations,
        };
        self.store.commit_transition(&commit).await?;

        if let Some(closed) = &commit.closed {
            ledger.calculator.push(closed);
        }
        ledger.open = Some(commit.opened.clone());
        ledger.recent.extend(commit.violations.iter().cloned());
        let horizon = self.lookback_start(request.timestamp);
        ledger.recent.retain(|v| v.detected_at >= horizon);

        Ok(TransitionOutcome {
            segment: commit.opened,
            closed: commit.closed,
            violations: commit.violations,
        })
    }

    async fn load_ledger(&self, driver_id: &DriverId, as_of: DateTime<Utc>) -> Result<DriverLedger> {
        self.ensure_known(driver_id).await?;

        let since = self.lookback_start(as_of);
        let segments = self.store.load_segments(driver_id, Some(since)).await?;
        let (calculator, open) = RollingWindowCalculator::from_history(self.rules(), &segments);
        let recent = effective(self.store.load_violations(driver_id, Some(since)).await?);

        debug!(
            driver_id = %driver_id,
            segments = segments.len(),
            arena = calculator.arena_len(),
            recent = recent.len(),
            "Driver ledger loaded"
        );

        Ok(DriverLedger {
            calculator,
            open,
            recent,
        })
    }

    /// Aggregates and current findings at `as_of` (default: now)
    pub async fn standing(
        &self,
        driver_id: &DriverId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<DriverStanding> {
        let as_of = as_of.unwrap_or_else(|| self.clock.now()).trunc_subsecs(0);
        self.ensure_known(driver_id).await?;

        let segments = self
            .store
            .load_segments(driver_id, Some(self.lookback_start(as_of)))
            .await?;
        let aggregates = self.aggregates_from(&segments, as_of);
        let findings = self.detector.evaluate(driver_id, &aggregates);

        Ok(DriverStanding {
            driver_id: driver_id.clone(),
            rule_set: self.rules().name.clone(),
            aggregates,
            findings,
        })
    }

    /// Window aggregates at `as_of` (default: now)
    pub async fn aggregates(
        &self,
        driver_id: &DriverId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<WindowAggregates> {
        Ok(self.standing(driver_id, as_of).await?.aggregates)
    }

    fn aggregates_from(&self, segments: &[DutyStatusSegment], as_of: DateTime<Utc>) -> WindowAggregates {
        let mut calculator = RollingWindowCalculator::new(self.rules());
        let mut tail = None;
        for segment in segments.iter().filter(|s| s.start_time() < as_of) {
            match segment.end_time() {
                Some(end) if end <= as_of => calculator.push(segment),
                _ => {
                    tail = Some(segment);
                    break;
                }
            }
        }
        calculator.aggregates_at(as_of, tail)
    }

    /// Effective violation records detected at or after `since`, in
    /// detection order
    ///
    /// Records replaced by a later recompute are left out.
    pub async fn violations(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Violation>> {
        self.ensure_known(driver_id).await?;

        let mut records: Vec<Violation> =
            effective(self.store.load_violations(driver_id, None).await?)
                .into_iter()
                .filter(|v| since.map_or(true, |since| v.detected_at >= since))
                .collect();
        order_by_detection(&mut records);
        Ok(records)
    }

    /// Replay the driver's history and reconcile stored findings
    ///
    /// Runs as a maintenance operation: recomputes are serialized with each
    /// other and hold the driver's lock throughout. `from` is the correction
    /// point honoured by [`RecomputePolicy::Prospective`].
    pub async fn recompute(
        &self,
        driver_id: &DriverId,
        from: Option<DateTime<Utc>>,
    ) -> Result<RecomputeReport> {
        let _maintenance = self.maintenance.lock().await;
        let mut slot = self.ledgers.acquire(driver_id).await?;
        self.ensure_known(driver_id).await?;

        let result = self.replay(driver_id, from).await;
        *slot = None;

        let report = result?;
        info!(
            driver_id = %driver_id,
            policy = %report.policy,
            replayed = report.replayed_segments,
            added = report.added.len(),
            superseded = report.superseded.len(),
            stale = report.stale.len(),
            "Recompute finished"
        );
        Ok(report)
    }

    /// Store a corrected revision of the segment starting at `start_time`,
    /// then recompute from that point
    ///
    /// Start and end times cannot be corrected.
    pub async fn correct_segment(
        &self,
        driver_id: &DriverId,
        start_time: DateTime<Utc>,
        correction: SegmentCorrection,
    ) -> Result<CorrectionOutcome> {
        if correction.is_empty() {
            return Err(HosError::invalid_input("correction does not change anything"));
        }
        let start_time = start_time.trunc_subsecs(0);

        let _maintenance = self.maintenance.lock().await;
        let mut slot = self.ledgers.acquire(driver_id).await?;
        self.ensure_known(driver_id).await?;

        let result = self.correct_locked(driver_id, start_time, &correction).await;
        *slot = None;

        let outcome = result?;
        info!(
            driver_id = %driver_id,
            start_time = %start_time,
            revision = outcome.segment.revision(),
            added = outcome.recompute.added.len(),
            "Segment correction recorded"
        );
        Ok(outcome)
    }

    async fn correct_locked(
        &self,
        driver_id: &DriverId,
        start_time: DateTime<Utc>,
        correction: &SegmentCorrection,
    ) -> Result<CorrectionOutcome> {
        let segment = self
            .store
            .load_segments(driver_id, Some(start_time))
            .await?
            .into_iter()
            .find(|s| s.start_time() == start_time)
            .ok_or_else(|| HosError::SegmentNotFound {
                driver_id: driver_id.to_string(),
                start_time,
            })?;

        let next = segment.corrected(correction);
        if next.status() == DutyStatus::Driving && next.vehicle_id().is_none() {
            return Err(HosError::VehicleRequired);
        }

        self.store.record_correction(&next).await?;
        let recompute = self.replay(driver_id, Some(start_time)).await?;

        Ok(CorrectionOutcome {
            segment: next,
            recompute,
        })
    }

    async fn replay(
        &self,
        driver_id: &DriverId,
        from: Option<DateTime<Utc>>,
    ) -> Result<RecomputeReport> {
        let policy = self.config.recompute_policy;
        let from = match policy {
            RecomputePolicy::Retroactive => None,
            RecomputePolicy::Prospective => from,
        };
        let in_scope = |v: &Violation| from.map_or(true, |from| v.detected_at >= from);

        let segments = self.store.load_segments(driver_id, None).await?;
        let stored = effective(self.store.load_violations(driver_id, None).await?);

        let mut calculator = RollingWindowCalculator::new(self.rules());
        let mut replayed: Vec<Violation> = Vec::new();
        let mut replayed_segments = 0;
        for segment in segments.iter().take_while(|s| !s.is_open()) {
            let found = self
                .detector
                .detect_crossings(&calculator, segment, &replayed);
            replayed.extend(found);
            calculator.push(segment);
            replayed_segments += 1;
        }

        let mut by_key: HashMap<_, &Violation> = stored
            .iter()
            .filter(|v| in_scope(v))
            .map(|v| (v.key(), v))
            .collect();

        let mut added = Vec::new();
        let mut superseded = Vec::new();
        let mut unchanged = 0;
        for finding in replayed.iter().filter(|v| in_scope(v)) {
            match by_key.remove(&finding.key()) {
                Some(existing) if existing.finding() == finding.finding() => unchanged += 1,
                Some(existing) => {
                    let mut record = finding.clone();
                    record.supersedes = Some(existing.id);
                    superseded.push(existing.id);
                    added.push(record);
                }
                None => added.push(finding.clone()),
            }
        }

        let mut stale: Vec<ViolationId> = by_key.values().map(|v| v.id).collect();
        stale.sort();
        sort_findings(&mut added);

        if !added.is_empty() {
            self.store.append_violations(driver_id, &added).await?;
        }

        Ok(RecomputeReport {
            driver_id: driver_id.clone(),
            policy,
            from,
            replayed_segments,
            unchanged,
            added,
            superseded,
            stale,
        })
    }

    async fn ensure_known(&self, driver_id: &DriverId) -> Result<()> {
        if self.store.driver_exists(driver_id).await? {
            Ok(())
        } else {
            Err(HosError::unknown_driver(driver_id.as_str()))
        }
    }

    fn lookback_start(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        let lookback = i64::try_from(self.config.history_lookback.as_secs()).unwrap_or(i64::MAX);
        from_secs(as_of.timestamp().saturating_sub(lookback))
    }
}

/// Drop records that a later record supersedes
fn effective(records: Vec<Violation>) -> Vec<Violation> {
    let replaced: HashSet<ViolationId> = records.iter().filter_map(|v| v.supersedes).collect();
    records
        .into_iter()
        .filter(|v| !replaced.contains(&v.id))
        .collect()
}

/// Detection time first, then most severe, then rule id
fn order_by_detection(records: &mut [Violation]) {
    sort_findings(records);
    records.sort_by_key(|v| v.detected_at);
}
