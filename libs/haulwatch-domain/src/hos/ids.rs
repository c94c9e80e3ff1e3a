use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a driver as issued by the fleet directory
///
/// Driver ids are opaque strings owned by the CRUD layer; the engine only
/// compares and orders them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Create a new DriverId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DriverId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DriverId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a vehicle (tractor unit)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    /// Create a new VehicleId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a Violation record
///
/// ViolationId is a wrapper around UUID v7 so that ids sort by creation time
/// and can't be mixed up with other UUIDs in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationId(Uuid);

impl ViolationId {
    /// Generate a new ViolationId
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a ViolationId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ViolationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViolationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ViolationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
