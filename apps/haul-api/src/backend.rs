//! Storage backends selected at start-up
//!
//! The service is generic over its ports; these enums let one binary run
//! against either the in-memory adapters or S3.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use haulwatch_domain::hos::{DriverId, DutyStatusSegment, Result as HosResult, VehicleId, Violation};
use haulwatch_domain::memory::{InMemoryDvirRegistry, InMemoryLogStore, MemorySeed};
use haulwatch_domain::ports::{DutyLogStore, TransitionCommit, VehicleInspectionGate};
use haulwatch_s3::{S3DvirGate, S3LogStore};
use tracing::info;

use crate::config::{AppConfig, BackendKind};

#[derive(Clone)]
pub enum LogBackend {
    Memory(InMemoryLogStore),
    S3(S3LogStore),
}

#[derive(Clone)]
pub enum GateBackend {
    Memory(InMemoryDvirRegistry),
    S3(S3DvirGate),
}

/// Build the log store and DVIR gate named by the configuration
pub async fn build(config: &AppConfig) -> Result<(LogBackend, GateBackend)> {
    match config.backend {
        BackendKind::Memory => {
            let store = InMemoryLogStore::new();
            let registry = InMemoryDvirRegistry::new();
            if let Some(path) = &config.memory_seed {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading memory seed from {}", path.display()))?;
                let seed = MemorySeed::from_json(&json)?;
                seed.apply(&store, &registry);
                info!(
                    drivers = seed.drivers.len(),
                    dvir_reports = seed.dvir_reports.len(),
                    "Seeded in-memory backend"
                );
            }
            info!("Using in-memory duty log");
            Ok((LogBackend::Memory(store), GateBackend::Memory(registry)))
        }
        BackendKind::S3 => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

            // Path-style addressing keeps MinIO and other S3-compatible stores working
            let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build();
            let client = aws_sdk_s3::Client::from_conf(s3_config);

            info!(bucket = %config.bucket, "Using S3 duty log");
            Ok((
                LogBackend::S3(S3LogStore::new(client.clone(), config.bucket.clone())),
                GateBackend::S3(S3DvirGate::new(client, config.bucket.clone())),
            ))
        }
    }
}

impl DutyLogStore for LogBackend {
    async fn driver_exists(&self, driver_id: &DriverId) -> HosResult<bool> {
        match self {
            Self::Memory(store) => store.driver_exists(driver_id).await,
            Self::S3(store) => store.driver_exists(driver_id).await,
        }
    }

    async fn load_segments(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> HosResult<Vec<DutyStatusSegment>> {
        match self {
            Self::Memory(store) => store.load_segments(driver_id, since).await,
            Self::S3(store) => store.load_segments(driver_id, since).await,
        }
    }

    async fn load_violations(
        &self,
        driver_id: &DriverId,
        since: Option<DateTime<Utc>>,
    ) -> HosResult<Vec<Violation>> {
        match self {
            Self::Memory(store) => store.load_violations(driver_id, since).await,
            Self::S3(store) => store.load_violations(driver_id, since).await,
        }
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> HosResult<()> {
        match self {
            Self::Memory(store) => store.commit_transition(commit).await,
            Self::S3(store) => store.commit_transition(commit).await,
        }
    }

    async fn record_correction(&self, segment: &DutyStatusSegment) -> HosResult<()> {
        match self {
            Self::Memory(store) => store.record_correction(segment).await,
            Self::S3(store) => store.record_correction(segment).await,
        }
    }

    async fn append_violations(
        &self,
        driver_id: &DriverId,
        violations: &[Violation],
    ) -> HosResult<()> {
        match self {
            Self::Memory(store) => store.append_violations(driver_id, violations).await,
            Self::S3(store) => store.append_violations(driver_id, violations).await,
        }
    }
}

impl VehicleInspectionGate for GateBackend {
    async fn is_vehicle_certified(
        &self,
        vehicle_id: &VehicleId,
        as_of: DateTime<Utc>,
    ) -> HosResult<bool> {
        match self {
            Self::Memory(registry) => registry.is_vehicle_certified(vehicle_id, as_of).await,
            Self::S3(gate) => gate.is_vehicle_certified(vehicle_id, as_of).await,
        }
    }
}
