//! Bounded admission into the complexity scorer
//!
//! The scorer is blocking and expensive. The gate caps how many scoring
//! calls may execute at once so that a burst of unclassified requests cannot
//! exhaust the blocking thread pool.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Default number of concurrent scoring calls
pub const DEFAULT_SCORER_CONCURRENCY: usize = 3;

/// A counting gate with FIFO admission
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionGate {
    /// Create a gate admitting at most `limit` holders at once.
    ///
    /// A limit of zero is raised to one so the gate can never deadlock.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a free slot.
    ///
    /// The slot is returned when the permit is dropped. Permits are owned so
    /// they can travel into blocking tasks that outlive the caller.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("admission gate closed".to_string()))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Configured slot count
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_SCORER_CONCURRENCY)
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("limit", &self.limit)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A held gate slot, released on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}
