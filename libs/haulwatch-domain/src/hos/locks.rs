//! Per-driver mutual exclusion
//!
//! Each driver gets its own async mutex guarding a slot of state. Requests
//! for different drivers never contend; requests for the same driver are
//! serialized and give up after a bounded wait instead of queueing forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::hos::error::{HosError, Result};
use crate::hos::ids::DriverId;

pub struct DriverLocks<T> {
    slots: Mutex<HashMap<DriverId, Arc<AsyncMutex<T>>>>,
    timeout: Duration,
}

impl<T: Default> DriverLocks<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, driver_id: &DriverId) -> Result<Arc<AsyncMutex<T>>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| HosError::internal_error("driver lock table poisoned"))?;
        Ok(slots
            .entry(driver_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(T::default())))
            .clone())
    }

    /// Acquire the driver's slot, failing with `LockTimeout` after the
    /// configured wait
    pub async fn acquire(&self, driver_id: &DriverId) -> Result<OwnedMutexGuard<T>> {
        let slot = self.slot(driver_id)?;
        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                let waited_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(driver_id = %driver_id, waited_ms, "Per-driver lock wait timed out");
                Err(HosError::LockTimeout {
                    driver_id: driver_id.to_string(),
                    waited_ms,
                })
            }
        }
    }

    /// Number of drivers that have been seen
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_driver_times_out_while_held() {
        let locks: DriverLocks<u32> = DriverLocks::new(Duration::from_millis(20));
        let driver = DriverId::new("drv-1");

        let _held = locks.acquire(&driver).await.unwrap();
        let err = locks.acquire(&driver).await.unwrap_err();

        assert!(matches!(err, HosError::LockTimeout { waited_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_different_drivers_do_not_contend() {
        let locks: DriverLocks<u32> = DriverLocks::new(Duration::from_millis(20));

        let _a = locks.acquire(&DriverId::new("drv-a")).await.unwrap();
        let b = locks.acquire(&DriverId::new("drv-b")).await;

        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_slot_state_survives_release() {
        let locks: DriverLocks<u32> = DriverLocks::new(Duration::from_millis(20));
        let driver = DriverId::new("drv-1");

        {
            let mut slot = locks.acquire(&driver).await.unwrap();
            *slot = 7;
        }
        let slot = locks.acquire(&driver).await.unwrap();
        assert_eq!(*slot, 7);
    }
}
