//! Domain errors for HOS operations
//!
//! Integrity and regulatory-gate errors reject a transition outright and are
//! never partially applied. Violations are not errors: they travel alongside
//! a successful transition.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Broad class of an error, used by adapters to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Log integrity: overlapping segments, unknown driver or segment
    Integrity,
    /// Regulatory precondition failed: rest, vehicle certification
    Gate,
    /// Malformed request content
    Input,
    /// Lock contention, storage, configuration, collaborators
    Infrastructure,
}

/// Errors that can occur while validating or recording duty-status changes
#[derive(Error, Debug)]
pub enum HosError {
    /// Attempted to drive without a qualifying rest period
    #[error("{required_secs}s of qualifying rest required before driving, found {rest_secs}s")]
    NoQualifyingRest { rest_secs: i64, required_secs: i64 },

    /// The DVIR gate refused the vehicle
    #[error("Vehicle {0} has no cleared inspection report")]
    VehicleNotCertified(String),

    /// A driving segment must reference a vehicle
    #[error("A vehicle id is required to start driving")]
    VehicleRequired,

    /// The timestamp does not continue the log: it overlaps the open segment,
    /// or leaves a gap after closed history with nothing open
    #[error("Timestamp {requested} does not continue the log at {open_start}")]
    OverlappingSegment {
        requested: DateTime<Utc>,
        open_start: DateTime<Utc>,
    },

    /// The driver is not known to the log store
    #[error("Unknown driver {0}")]
    UnknownDriver(String),

    /// No segment starts at the given time for the driver
    #[error("No segment for driver {driver_id} starts at {start_time}")]
    SegmentNotFound {
        driver_id: String,
        start_time: DateTime<Utc>,
    },

    /// The per-driver lock could not be acquired in time
    #[error("Timed out after {waited_ms}ms waiting for driver {driver_id}")]
    LockTimeout { driver_id: String, waited_ms: u64 },

    /// The request content is invalid
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The log store failed
    #[error("Storage operation failed: {0}")]
    StorageFailure(String),

    /// The DVIR collaborator failed (as opposed to refusing the vehicle)
    #[error("Inspection gate failed: {0}")]
    GateFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An unexpected internal error occurred
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HosError {
    /// Create an insufficient rest error
    pub fn no_qualifying_rest(rest_secs: i64, required_secs: i64) -> Self {
        Self::NoQualifyingRest {
            rest_secs,
            required_secs,
        }
    }

    /// Create a vehicle not certified error
    pub fn vehicle_not_certified(vehicle_id: impl Into<String>) -> Self {
        Self::VehicleNotCertified(vehicle_id.into())
    }

    /// Create an unknown driver error
    pub fn unknown_driver(driver_id: impl Into<String>) -> Self {
        Self::UnknownDriver(driver_id.into())
    }

    /// Create an invalid input error with a message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a storage failure error with a message
    pub fn storage_failure(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    /// Create a gate failure error with a message
    pub fn gate_failure(msg: impl Into<String>) -> Self {
        Self::GateFailure(msg.into())
    }

    /// Create a config error with a message
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an internal error with a message
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable machine-readable code, shown to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoQualifyingRest { .. } => "ERR_NO_QUALIFYING_REST",
            Self::VehicleNotCertified(_) => "ERR_VEHICLE_NOT_CERTIFIED",
            Self::VehicleRequired => "ERR_VEHICLE_REQUIRED",
            Self::OverlappingSegment { .. } => "ERR_OVERLAPPING_SEGMENT",
            Self::UnknownDriver(_) => "ERR_UNKNOWN_DRIVER",
            Self::SegmentNotFound { .. } => "ERR_SEGMENT_NOT_FOUND",
            Self::LockTimeout { .. } => "ERR_LOCK_TIMEOUT",
            Self::InvalidInput(_) => "ERR_INVALID_INPUT",
            Self::StorageFailure(_) => "ERR_STORAGE",
            Self::GateFailure(_) => "ERR_GATE",
            Self::ConfigError(_) => "ERR_CONFIG",
            Self::InternalError(_) => "ERR_INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OverlappingSegment { .. }
            | Self::UnknownDriver(_)
            | Self::SegmentNotFound { .. } => ErrorCategory::Integrity,
            Self::NoQualifyingRest { .. }
            | Self::VehicleNotCertified(_)
            | Self::VehicleRequired => ErrorCategory::Gate,
            Self::InvalidInput(_) => ErrorCategory::Input,
            Self::LockTimeout { .. }
            | Self::StorageFailure(_)
            | Self::GateFailure(_)
            | Self::ConfigError(_)
            | Self::InternalError(_) => ErrorCategory::Infrastructure,
        }
    }
}

/// Result type alias for HOS operations
pub type Result<T> = std::result::Result<T, HosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_qualifying_rest_message() {
        let err = HosError::no_qualifying_rest(28_800, 36_000);
        assert_eq!(err.code(), "ERR_NO_QUALIFYING_REST");
        assert_eq!(err.category(), ErrorCategory::Gate);
        assert!(err.to_string().contains("36000s"));
        assert!(err.to_string().contains("28800s"));
    }

    #[test]
    fn test_storage_failure_error() {
        let err = HosError::storage_failure("S3 connection failed");
        assert!(matches!(err, HosError::StorageFailure(_)));
        assert_eq!(
            err.to_string(),
            "Storage operation failed: S3 connection failed"
        );
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_integrity_errors() {
        let err = HosError::unknown_driver("drv-404");
        assert_eq!(err.code(), "ERR_UNKNOWN_DRIVER");
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert_eq!(err.to_string(), "Unknown driver drv-404");
    }

    #[test]
    fn test_vehicle_not_certified_error() {
        let err = HosError::vehicle_not_certified("truck-9");
        assert_eq!(err.code(), "ERR_VEHICLE_NOT_CERTIFIED");
        assert!(err.to_string().contains("truck-9"));
    }
}
