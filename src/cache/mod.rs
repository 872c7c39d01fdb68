//! Client-side caching for competency snapshots
//!
//! The progress cache holds per-subject snapshots and applies optimistic
//! updates; the update queue holds the mutations still owed to the remote
//! store.

mod progress;
mod update_queue;

pub use progress::{Applied, CacheEntry, ProgressCache};
pub use update_queue::{PendingUpdate, UpdatePayload, UpdateQueue};

use serde::Serialize;

/// Observability counters across the cache and queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub cached_subjects: usize,
    pub pending_update_count: usize,
    pub dirty_entry_count: usize,
    pub in_flight_fetches: usize,
    /// Updates dropped after exhausting their attempts, since startup
    pub dropped_updates: u64,
}
