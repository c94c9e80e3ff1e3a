//! # HaulWatch Domain Layer
//!
//! This crate contains the Hours-of-Service compliance engine for the
//! HaulWatch fleet platform. It follows hexagonal architecture principles:
//!
//! - **Entities**: duty-status segments, violations, rule sets
//! - **Engine**: rolling-window calculator, violation detector, state machine
//! - **Ports**: trait definitions for the duty-status log, the DVIR workflow
//!   and the clock
//! - **Services**: transition orchestration, queries and recompute
//!
//! ## Architecture
//!
//! This layer has NO dependencies on infrastructure concerns (AWS, S3, HTTP).
//! The [`memory`] module provides process-local adapters for tests and local
//! runs; the S3 adapter lives in `haulwatch-s3`.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use haulwatch_domain::hos::{
//!     DriverId, DutyStatus, HosConfig, HosService, RuleSet, TransitionRequest,
//! };
//! use haulwatch_domain::memory::{InMemoryDvirRegistry, InMemoryLogStore};
//!
//! # async fn example() -> haulwatch_domain::hos::Result<()> {
//! let store = InMemoryLogStore::new();
//! store.register_driver(DriverId::new("drv-1"));
//! let service = HosService::new(
//!     store,
//!     InMemoryDvirRegistry::new(),
//!     RuleSet::us_federal(),
//!     HosConfig::default(),
//! );
//!
//! let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let outcome = service
//!     .transition(TransitionRequest::new(DriverId::new("drv-1"), DutyStatus::OffDuty, at))
//!     .await?;
//! assert!(outcome.violations.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod hos;
pub mod memory;
pub mod ports;

// Re-export commonly used types
pub use hos::{HosError, HosService, RuleSet, WindowAggregates};
pub use ports::{Clock, DutyLogStore, SystemClock, VehicleInspectionGate};
