//! In-memory adapters
//!
//! Process-local implementations of the log store and DVIR ports, used by the
//! test suites and by the API when it runs without S3. State lives behind an
//! `Arc`, so clones share the same tables.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::hos::{
    DriverId, DutyStatusSegment, DvirReport, HosError, Result, VehicleId, Violation,
};
use crate::ports::{Clock, DutyLogStore, TransitionCommit, VehicleInspectionGate};

/// Segment revisions keyed by `(start_secs, revision)`
type SegmentTable = BTreeMap<(i64, u32), DutyStatusSegment>;

#[derive(Debug, Default)]
struct LogTables {
    drivers: BTreeSet<DriverId>,
    segments: HashMap<DriverId, SegmentTable>,
    violations: HashMap<DriverId, Vec<Violation>>,
}

/// Duty-status log held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStore {
    tables: Arc<RwLock<LogTables>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a driver known to the store
    pub fn register_driver(&self, driver_id: DriverId) {
        if let Ok(mut tables) = self.tables.write() {
            tables.drivers.insert(driver_id);
        }
    }

    /// Fail the next `commit_transition` call without writing anything
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LogTables>> {
        self.tables
            .read()
            .map_err(|_| HosError::storage_failure("in-memory log store poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LogTables>> {
        self.tables
            .write()
            .map_err(|_| HosError::storage_failure("in-memory log store poisoned"))
    }
}

/// Latest revision per start time, in start order
fn latest_revisions(table: &SegmentTable) -> Vec<DutyStatusSegment> {
    let mut latest: BTreeMap<i64, &DutyStatusSegment> = BTreeMap::new();
    for ((start, _), segment) in table {
        latest.insert(*start, segment);
    }
    latest.into_values().cloned().collect()
}

fn segment_key(segment: &DutyStatusSegment) -> (i64, u32) {
    (segment.start_secs(), segment.revision())
}

impl DutyLogStore for InMemoryLogStore {
    async fn driver_exists(&self, driver_id: &DriverId) -> Result<bool> {
        Ok(self.read()?.drivers.contains(driver_id))
    }

    async fn load_segments(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<DutyStatusSegment>> {
        let tables = self.read()?;
        let segments = tables
            .segments
            .get(driver_id)
            .map(latest_revisions)
            .unwrap_or_default();

        let Some(since) = since else {
            return Ok(segments);
        };
        Ok(segments
            .into_iter()
            .filter(|segment| segment.end_time().map_or(true, |end| end > since))
            .collect())
    }

    async fn load_violations(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Violation>> {
        let tables = self.read()?;
        let mut records: Vec<Violation> = tables
            .violations
            .get(driver_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|v| since.map_or(true, |since| v.detected_at >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|v| v.detected_at);
        Ok(records)
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(HosError::storage_failure("injected commit failure"));
        }

        let mut guard = self.write()?;
        let tables = &mut *guard;
        let table = tables.segments.entry(commit.driver_id.clone()).or_default();

        // Optimistic check: the segment being closed must be the one that is open
        let open = latest_revisions(table).into_iter().find(|s| s.is_open());
        let expected = commit.closed.as_ref().map(DutyStatusSegment::start_time);
        if open.as_ref().map(DutyStatusSegment::start_time) != expected {
            return Err(HosError::OverlappingSegment {
                requested: commit.opened.start_time(),
                open_start: open
                    .map(|s| s.start_time())
                    .unwrap_or_else(|| commit.opened.start_time()),
            });
        }

        if let Some(closed) = &commit.closed {
            table.insert(segment_key(closed), closed.clone());
        }
        table.insert(segment_key(&commit.opened), commit.opened.clone());
        tables
            .violations
            .entry(commit.driver_id.clone())
            .or_default()
            .extend(commit.violations.iter().cloned());
        Ok(())
    }

    async fn record_correction(&self, segment: &DutyStatusSegment) -> Result<()> {
        let mut tables = self.write()?;
        tables
            .segments
            .entry(segment.driver_id().clone())
            .or_default()
            .insert(segment_key(segment), segment.clone());
        Ok(())
    }

    async fn append_violations(&self, driver_id: &DriverId, violations: &[Violation]) -> Result<()> {
        self.write()?
            .violations
            .entry(driver_id.clone())
            .or_default()
            .extend(violations.iter().cloned());
        Ok(())
    }
}

/// DVIR reports held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDvirRegistry {
    reports: Arc<RwLock<HashMap<VehicleId, Vec<DvirReport>>>>,
}

impl InMemoryDvirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_report(&self, report: DvirReport) {
        if let Ok(mut reports) = self.reports.write() {
            let history = reports.entry(report.vehicle_id.clone()).or_default();
            history.push(report);
            history.sort_by_key(|r| r.inspected_at);
        }
    }

    /// Record a cleared inspection for `vehicle_id`
    pub fn certify(&self, vehicle_id: VehicleId, inspected_at: DateTime<Utc>) {
        self.record_report(DvirReport {
            vehicle_id,
            inspected_at,
            defects_cleared: true,
        });
    }
}

impl VehicleInspectionGate for InMemoryDvirRegistry {
    /// The latest report at or before `as_of` decides
    async fn is_vehicle_certified(&self, vehicle_id: &VehicleId, as_of: DateTime<Utc>) -> Result<bool> {
        let reports = self
            .reports
            .read()
            .map_err(|_| HosError::gate_failure("in-memory DVIR registry poisoned"))?;
        Ok(reports
            .get(vehicle_id)
            .and_then(|history| history.iter().rev().find(|r| r.inspected_at <= as_of))
            .is_some_and(|report| report.defects_cleared))
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Fixture loaded into the in-memory adapters at start-up
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub drivers: Vec<DriverId>,
    #[serde(default)]
    pub dvir_reports: Vec<DvirReport>,
}

impl MemorySeed {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| HosError::config_error(format!("invalid memory seed: {}", e)))
    }

    pub fn apply(&self, store: &InMemoryLogStore, registry: &InMemoryDvirRegistry) {
        for driver_id in &self.drivers {
            store.register_driver(driver_id.clone());
        }
        for report in &self.dvir_reports {
            registry.record_report(report.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hos::DutyStatus;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn open(status: DutyStatus, hour: u32) -> DutyStatusSegment {
        DutyStatusSegment::open(DriverId::new("drv-1"), status, at(hour), None)
    }

    fn commit(closed: Option<DutyStatusSegment>, opened: DutyStatusSegment) -> TransitionCommit {
        TransitionCommit {
            driver_id: DriverId::new("drv-1"),
            closed,
            opened,
            violations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_replaces_open_segment() {
        let store = InMemoryLogStore::new();
        let first = open(DutyStatus::OffDuty, 0);
        store.commit_transition(&commit(None, first.clone())).await.unwrap();
        store
            .commit_transition(&commit(
                Some(first.closed_at(at(10))),
                open(DutyStatus::OnDutyNotDriving, 10),
            ))
            .await
            .unwrap();

        let segments = store
            .load_segments(&DriverId::new("drv-1"), None)
            .await
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end_time(), Some(at(10)));
        assert!(segments[1].is_open());
    }

    #[tokio::test]
    async fn test_commit_against_stale_open_segment_is_rejected() {
        let store = InMemoryLogStore::new();
        let first = open(DutyStatus::OffDuty, 0);
        store.commit_transition(&commit(None, first)).await.unwrap();

        let err = store
            .commit_transition(&commit(None, open(DutyStatus::Driving, 5)))
            .await
            .unwrap_err();
        assert!(matches!(err, HosError::OverlappingSegment { .. }));
    }

    #[tokio::test]
    async fn test_load_segments_since_keeps_covering_segment() {
        let store = InMemoryLogStore::new();
        let first = open(DutyStatus::OffDuty, 0);
        let second = open(DutyStatus::OnDutyNotDriving, 10);
        store.commit_transition(&commit(None, first.clone())).await.unwrap();
        store
            .commit_transition(&commit(Some(first.closed_at(at(10))), second.clone()))
            .await
            .unwrap();
        store
            .commit_transition(&commit(
                Some(second.closed_at(at(12))),
                open(DutyStatus::OffDuty, 12),
            ))
            .await
            .unwrap();

        let segments = store
            .load_segments(&DriverId::new("drv-1"), Some(at(11)))
            .await
            .unwrap();
        let starts: Vec<_> = segments.iter().map(|s| s.start_time()).collect();
        assert_eq!(starts, vec![at(10), at(12)]);
    }

    #[tokio::test]
    async fn test_dvir_latest_report_before_as_of_decides() {
        let registry = InMemoryDvirRegistry::new();
        let truck = VehicleId::new("truck-1");
        registry.certify(truck.clone(), at(6));
        registry.record_report(DvirReport {
            vehicle_id: truck.clone(),
            inspected_at: at(12),
            defects_cleared: false,
        });

        assert!(!registry.is_vehicle_certified(&truck, at(5)).await.unwrap());
        assert!(registry.is_vehicle_certified(&truck, at(8)).await.unwrap());
        assert!(!registry.is_vehicle_certified(&truck, at(13)).await.unwrap());
        assert!(!registry
            .is_vehicle_certified(&VehicleId::new("unknown"), at(13))
            .await
            .unwrap());
    }

    #[test]
    fn test_memory_seed_from_json() {
        let seed = MemorySeed::from_json(
            r#"{
                "drivers": ["drv-1", "drv-2"],
                "dvir_reports": [
                    { "vehicle_id": "truck-1", "inspected_at": "2024-05-01T05:00:00Z", "defects_cleared": true }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(seed.drivers.len(), 2);

        let store = InMemoryLogStore::new();
        let registry = InMemoryDvirRegistry::new();
        seed.apply(&store, &registry);
        assert!(store.read().unwrap().drivers.contains(&DriverId::new("drv-2")));
    }
}
