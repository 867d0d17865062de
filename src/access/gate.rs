//! Admission gate: bounds the number of remote operations in flight.
//!
//! Every remote-touching path holds an [`AdmissionPermit`] for the duration
//! of the call. Dropping the permit releases the slot, so a failing or
//! cancelled call can never leak one. Waiters are woken as soon as a slot
//! frees up. There is no deadline on the wait; callers own their timeouts.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Admission gate is closed")]
    Closed,
}

/// Counting admission controller.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

/// A held admission slot. Released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate admitting at most `max_concurrent` operations (minimum 1).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GateError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        debug!(active = self.active(), max = self.max_concurrent, "Admitted remote operation");
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Result<Option<AdmissionPermit>, GateError> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(AdmissionPermit { _permit: permit })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(GateError::Closed),
        }
    }

    /// Operations currently admitted, including those still finishing after
    /// the gate was closed.
    pub fn active(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.permits.available_permits())
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Reject all pending and future acquisitions.
    pub fn close(&self) {
        self.permits.close();
        info!("Admission gate closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_count_tracks_permits() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.active(), 0);

        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.active(), 2);
        assert!(gate.try_acquire().unwrap().is_none());

        drop(a);
        assert_eq!(gate.active(), 1);
        drop(b);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_closed_gate_rejects() {
        let gate = AdmissionGate::new(1);
        gate.close();
        assert_eq!(gate.acquire().await.unwrap_err(), GateError::Closed);
        assert!(matches!(gate.try_acquire(), Err(GateError::Closed)));
    }

    #[tokio::test]
    async fn test_close_keeps_counting_held_permits() {
        let gate = AdmissionGate::new(3);
        let held = gate.acquire().await.unwrap();
        gate.close();
        assert_eq!(gate.active(), 1);

        drop(held);
        assert_eq!(gate.active(), 0);
    }

    #[test]
    fn test_zero_clamped() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.max_concurrent(), 1);
    }
}
