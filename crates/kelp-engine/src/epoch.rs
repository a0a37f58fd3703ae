//! Source of the current network epoch.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kelp_placement::PlacementMap;

/// Where the coordinator learns the current epoch (tombstone creation and
/// expiration are expressed in epochs).
#[async_trait]
pub trait EpochSource: Send + Sync {
    async fn current_epoch(&self) -> u64;
}

/// The epoch of the current topology snapshot.
#[async_trait]
impl EpochSource for PlacementMap {
    async fn current_epoch(&self) -> u64 {
        self.epoch().await
    }
}

/// Epoch set by hand.
#[derive(Debug, Default)]
pub struct ManualEpoch(AtomicU64);

impl ManualEpoch {
    pub fn new(epoch: u64) -> Self {
        Self(AtomicU64::new(epoch))
    }

    pub fn set(&self, epoch: u64) {
        self.0.store(epoch, Ordering::SeqCst);
    }

    /// Move one epoch forward; returns the new epoch.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl EpochSource for ManualEpoch {
    async fn current_epoch(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
