//! Admission gate: a counting semaphore whose acquire gives up when the
//! caller's cancellation token fires.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Returned by [`AdmissionGate::acquire`] when the token fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Bounds how many units of work hold a slot at once.
///
/// A slot is released when its [`OwnedSemaphorePermit`] is dropped, so it is
/// returned exactly once on every exit path of the holder, unwinding included.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot or for `token` to fire. Cancellation wins when both
    /// are ready.
    pub async fn acquire(
        &self,
        token: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, Cancelled> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            // the semaphore is never closed
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.map_err(|_| Cancelled),
        }
    }
}
