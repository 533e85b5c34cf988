//! Admission control.
//!
//! # Responsibilities
//! - Track free worker slots (capacity counter in `[0, N]`)
//! - Claim a slot atomically, or refuse without blocking
//! - Release the slot when the holder is dropped
//!
//! # Design Decisions
//! - A counting semaphore makes check-and-claim one atomic step; there is no
//!   separate load followed by a decrement
//! - The slot is an RAII permit that travels with the work item, so every
//!   exit path (success, exhausted retries, panic, failed enqueue) releases it

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::dispatch::types::DispatchError;

/// Gatekeeper limiting in-flight work items to a fixed capacity.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionController {
    /// Create a controller with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Claim one slot if any is free.
    pub fn try_admit(&self) -> Result<CapacityPermit, DispatchError> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(CapacityPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(DispatchError::SaturatedCapacity),
            Err(TryAcquireError::Closed) => Err(DispatchError::ShuttingDown),
        }
    }

    /// Refuse all future admissions. Held permits stay valid.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Number of idle slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Number of admitted items that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Configured maximum.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed worker slot.
///
/// When dropped, the slot is released back to the controller.
#[derive(Debug)]
pub struct CapacityPermit {
    _permit: OwnedSemaphorePermit,
}
