//! Per-region mutual exclusion.
//!
//! The controller has no transactions, so two requests touching the same
//! region (first attach racing second attach, attach racing detach) must not
//! interleave their driver calls. Each region name maps to its own async
//! mutex; different regions never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by region name.
#[derive(Debug, Default)]
pub struct RegionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RegionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `region`.
    ///
    /// The guard releases the region when dropped.
    pub async fn lock(&self, region: &str) -> OwnedMutexGuard<()> {
        // The map shard guard must be released before awaiting.
        let lock = self
            .locks
            .entry(region.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Returns true if some task currently holds or awaits `region`.
    pub fn is_contended(&self, region: &str) -> bool {
        self.locks
            .get(region)
            .map(|lock| Arc::strong_count(lock.value()) > 1)
            .unwrap_or(false)
    }

    /// Drops table entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
