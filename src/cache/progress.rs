//! Progress cache - in-memory competency snapshots with optimistic updates
//!
//! Holds the latest known snapshot per subject, a dirty flag and the last
//! confirmed sync time. Reads go through here and fall back to the remote
//! store on a miss or when a clean entry has gone stale.
//!
//! ## Freshness
//!
//! A clean entry is served until it is older than the freshness window.
//! A dirty entry is always served: re-fetching it would let the remote copy
//! overwrite local changes that have not been pushed yet.
//!
//! ## Single-flight
//!
//! Concurrent misses for the same subject share one remote fetch. The first
//! caller registers a broadcast channel and performs the fetch; later callers
//! subscribe and receive the same result.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CompetencyError, Result};
use crate::models::{CompetencySnapshot, SubjectId};
use crate::scoring::{unlocks, Mutation, MutationEffect, ScoringRules};
use crate::traits::RemotePersistence;

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached snapshot and its sync bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: CompetencySnapshot,
    /// Last time the remote store confirmed this snapshot
    pub last_sync_at: DateTime<Utc>,
    /// Local changes not yet confirmed by the remote store
    pub is_dirty: bool,
    /// Incremented on every local mutation
    pub revision: u64,
    /// When the entry was last known to match the remote store; `None`
    /// forces the next read to re-fetch
    fetched_at: Option<Instant>,
}

impl CacheEntry {
    fn fetched(snapshot: CompetencySnapshot) -> Self {
        Self {
            snapshot,
            last_sync_at: Utc::now(),
            is_dirty: false,
            revision: 0,
            fetched_at: Some(Instant::now()),
        }
    }

    fn is_servable(&self, freshness: Duration) -> bool {
        self.is_dirty || self.fetched_at.map_or(false, |at| at.elapsed() < freshness)
    }
}

/// Result of an optimistic mutation
#[derive(Debug, Clone)]
pub struct Applied {
    pub snapshot: CompetencySnapshot,
    pub effect: MutationEffect,
    /// Entry revision after the mutation
    pub revision: u64,
}

type FetchResult = Result<CompetencySnapshot>;

/// Role of a `get` call that missed the cache
enum FetchRole {
    Hit(CompetencySnapshot),
    Leader(broadcast::Sender<FetchResult>),
    Follower(broadcast::Receiver<FetchResult>),
}

// =============================================================================
// Progress Cache
// =============================================================================

/// In-memory snapshot cache keyed by subject.
///
/// No automatic eviction: the dataset is per-session and small. Entries go
/// away only through [`ProgressCache::evict`] or [`ProgressCache::clear`].
pub struct ProgressCache {
    remote: Arc<dyn RemotePersistence>,
    rules: ScoringRules,
    freshness: Duration,
    remote_timeout: Duration,
    entries: DashMap<SubjectId, CacheEntry>,
    in_flight: DashMap<SubjectId, broadcast::Sender<FetchResult>>,
}

impl ProgressCache {
    pub fn new(
        remote: Arc<dyn RemotePersistence>,
        rules: ScoringRules,
        freshness: Duration,
        remote_timeout: Duration,
    ) -> Self {
        info!(
            freshness_secs = freshness.as_secs(),
            remote_timeout_ms = remote_timeout.as_millis() as u64,
            "ProgressCache initialized"
        );

        Self {
            remote,
            rules,
            freshness,
            remote_timeout,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a subject's snapshot, fetching it on a miss or when stale.
    ///
    /// Fetch failures (including `NotFound`) are returned to the caller;
    /// no synthetic snapshot is ever substituted.
    pub async fn get(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        if let Some(snapshot) = self.servable(subject) {
            debug!(subject = %subject, "Cache hit");
            return Ok(snapshot);
        }

        let role = match self.in_flight.entry(subject.clone()) {
            Entry::Occupied(in_flight) => FetchRole::Follower(in_flight.get().subscribe()),
            Entry::Vacant(slot) => match self.servable(subject) {
                // Another leader finished between our first check and now
                Some(snapshot) => FetchRole::Hit(snapshot),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    slot.insert(sender.clone());
                    FetchRole::Leader(sender)
                }
            },
        };

        match role {
            FetchRole::Hit(snapshot) => Ok(snapshot),
            FetchRole::Follower(mut receiver) => {
                debug!(subject = %subject, "Joining in-flight fetch");
                receiver.recv().await.unwrap_or_else(|_| {
                    Err(CompetencyError::Delivery(format!(
                        "fetch for {} was abandoned",
                        subject
                    )))
                })
            }
            FetchRole::Leader(sender) => {
                let guard = InFlightGuard::new(&self.in_flight, subject, sender);
                let result = self.fetch_and_store(subject).await;
                guard.complete(result.clone());
                result
            }
        }
    }

    /// Cached snapshot without touching the remote store
    pub fn peek(&self, subject: &SubjectId) -> Option<CompetencySnapshot> {
        self.entries.get(subject).map(|entry| entry.snapshot.clone())
    }

    /// Cached entry with its sync bookkeeping
    pub fn entry(&self, subject: &SubjectId) -> Option<CacheEntry> {
        self.entries.get(subject).map(|entry| entry.clone())
    }

    /// Force the next read to go to the remote store, then read.
    ///
    /// A dirty entry is returned as-is: its local changes would otherwise be
    /// lost.
    pub async fn refresh(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        if let Some(mut entry) = self.entries.get_mut(subject) {
            if entry.is_dirty {
                warn!(subject = %subject, "Refresh skipped, entry has unsynced changes");
                return Ok(entry.snapshot.clone());
            }
            entry.fetched_at = None;
        }
        self.get(subject).await
    }

    fn servable(&self, subject: &SubjectId) -> Option<CompetencySnapshot> {
        self.entries
            .get(subject)
            .filter(|entry| entry.is_servable(self.freshness))
            .map(|entry| entry.snapshot.clone())
    }

    async fn fetch_and_store(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        debug!(subject = %subject, "Cache miss, fetching snapshot");

        let fetch = self.remote.fetch_snapshot(subject);
        let mut snapshot = tokio::time::timeout(self.remote_timeout, fetch)
            .await
            .map_err(|_| CompetencyError::Timeout(self.remote_timeout.as_millis() as u64))??;

        snapshot.subject_id = subject.clone();
        snapshot.current_scores = snapshot.current_scores.clamped();
        snapshot.baseline_scores = snapshot.baseline_scores.clamped();
        snapshot.recent_actions.truncate(self.rules.policy().recent_action_limit);
        unlocks::merge_unlocks(&mut snapshot, self.rules.unlock_threshold());

        match self.entries.entry(subject.clone()) {
            Entry::Occupied(existing) if existing.get().is_dirty => {
                // Mutated while the fetch was in flight; local changes win
                warn!(subject = %subject, "Fetched snapshot discarded, entry has unsynced changes");
                Ok(existing.get().snapshot.clone())
            }
            Entry::Occupied(mut existing) => {
                existing.insert(CacheEntry::fetched(snapshot.clone()));
                Ok(snapshot)
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::fetched(snapshot.clone()));
                Ok(snapshot)
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a mutation to the cached snapshot and mark it dirty.
    ///
    /// Synchronous: never waits on the network. The subject must have been
    /// loaded with [`ProgressCache::get`] first.
    pub fn apply_optimistic(&self, subject: &SubjectId, mutation: &Mutation) -> Result<Applied> {
        validate(mutation)?;

        let mut entry = self
            .entries
            .get_mut(subject)
            .ok_or_else(|| CompetencyError::NotInitialized(subject.to_string()))?;

        let effect = self.rules.apply(&mut entry.snapshot, mutation, Utc::now());
        if effect.is_change() {
            entry.is_dirty = true;
            entry.revision += 1;
        }

        Ok(Applied {
            snapshot: entry.snapshot.clone(),
            effect,
            revision: entry.revision,
        })
    }

    /// Clear the dirty flag after a confirmed remote write
    pub fn mark_clean(&self, subject: &SubjectId) {
        if let Some(mut entry) = self.entries.get_mut(subject) {
            entry.is_dirty = false;
            entry.last_sync_at = Utc::now();
            entry.fetched_at = Some(Instant::now());
        }
    }

    /// Clear the dirty flag only if nothing changed since `revision` was
    /// pushed. Returns whether the entry is now clean.
    pub fn mark_synced(&self, subject: &SubjectId, revision: u64) -> bool {
        match self.entries.get_mut(subject) {
            Some(mut entry) if entry.revision == revision => {
                entry.is_dirty = false;
                entry.last_sync_at = Utc::now();
                entry.fetched_at = Some(Instant::now());
                true
            }
            Some(entry) => {
                debug!(
                    subject = %subject,
                    pushed = revision,
                    current = entry.revision,
                    "Entry changed during sync, staying dirty"
                );
                false
            }
            None => false,
        }
    }

    // =========================================================================
    // Sync support
    // =========================================================================

    /// Subjects whose entries have unsynced changes
    pub fn dirty_subjects(&self) -> Vec<SubjectId> {
        self.entries
            .iter()
            .filter(|entry| entry.is_dirty)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot and revision of a dirty entry
    pub fn snapshot_for_sync(&self, subject: &SubjectId) -> Option<(CompetencySnapshot, u64)> {
        self.entries
            .get(subject)
            .filter(|entry| entry.is_dirty)
            .map(|entry| (entry.snapshot.clone(), entry.revision))
    }

    // =========================================================================
    // Status and Maintenance
    // =========================================================================

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_dirty).count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Remove one subject's entry
    pub fn evict(&self, subject: &SubjectId) -> Option<CacheEntry> {
        let removed = self.entries.remove(subject).map(|(_, entry)| entry);
        if let Some(entry) = &removed {
            if entry.is_dirty {
                warn!(subject = %subject, "Evicted entry with unsynced changes");
            }
        }
        removed
    }

    /// Remove every entry.
    ///
    /// Warning: unsynced local changes are dropped.
    pub fn clear(&self) {
        let dirty = self.dirty_count();
        self.entries.clear();
        if dirty > 0 {
            warn!(dirty, "Progress cache cleared with unsynced entries");
        }
    }
}

fn validate(mutation: &Mutation) -> Result<()> {
    match mutation {
        Mutation::RecordAction(input) => input.validate(),
        Mutation::UnlockAchievement { achievement_id, .. } => {
            if achievement_id.trim().is_empty() {
                return Err(CompetencyError::Validation("achievement_id required".into()));
            }
            Ok(())
        }
    }
}

/// Removes the leader's in-flight registration when its fetch finishes or
/// is dropped. Only the leader's own channel is removed, never one a later
/// leader registered. Dropping the sender wakes followers with an error.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<SubjectId, broadcast::Sender<FetchResult>>,
    subject: &'a SubjectId,
    sender: Option<broadcast::Sender<FetchResult>>,
}

impl<'a> InFlightGuard<'a> {
    fn new(
        in_flight: &'a DashMap<SubjectId, broadcast::Sender<FetchResult>>,
        subject: &'a SubjectId,
        sender: broadcast::Sender<FetchResult>,
    ) -> Self {
        Self {
            in_flight,
            subject,
            sender: Some(sender),
        }
    }

    fn complete(mut self, result: FetchResult) {
        if let Some(sender) = self.release() {
            // Ignore send errors - followers may have dropped
            let _ = sender.send(result);
        }
    }

    fn release(&mut self) -> Option<broadcast::Sender<FetchResult>> {
        let sender = self.sender.take()?;
        self.in_flight
            .remove_if(self.subject, |_, registered| registered.same_channel(&sender));
        Some(sender)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionInput, Category, CompetencyScores, ImpactLevel};
    use crate::persistence::MemoryPersistence;

    fn cache_with(store: Arc<MemoryPersistence>) -> ProgressCache {
        ProgressCache::new(
            store,
            ScoringRules::default(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        )
    }

    fn meeting() -> Mutation {
        Mutation::RecordAction(ActionInput::new(
            "customer_meeting",
            Category::ValueCommunication,
            "Discovery call",
            ImpactLevel::Medium,
        ))
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::new(40.0, 40.0, 40.0)));
        let cache = cache_with(store.clone());
        let subject = SubjectId::from("s1");

        cache.get(&subject).await.unwrap();
        cache.get(&subject).await.unwrap();

        assert_eq!(store.fetch_count(), 1);
        assert!(!cache.entry(&subject).unwrap().is_dirty);
    }

    #[tokio::test]
    async fn test_not_found_surfaces() {
        let cache = cache_with(Arc::new(MemoryPersistence::new()));
        let err = cache.get(&SubjectId::from("ghost")).await.unwrap_err();
        assert_eq!(err, CompetencyError::NotFound("ghost".into()));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_clean_entry_refetched() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store.clone());
        let subject = SubjectId::from("s1");

        cache.get(&subject).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.get(&subject).await.unwrap();

        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_dirty_entry_not_refetched() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store.clone());
        let subject = SubjectId::from("s1");

        cache.get(&subject).await.unwrap();
        cache.apply_optimistic(&subject, &meeting()).unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        let snapshot = cache.get(&subject).await.unwrap();
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(snapshot.total_points, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight() {
        let store = Arc::new(MemoryPersistence::new().with_latency(Duration::from_millis(200)));
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store.clone());
        let subject = SubjectId::from("s1");

        let (a, b) = tokio::join!(cache.get(&subject), cache.get(&subject));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[test]
    fn test_finished_leader_leaves_newer_registration() {
        let in_flight: DashMap<SubjectId, broadcast::Sender<FetchResult>> = DashMap::new();
        let subject = SubjectId::from("s1");

        let (first, _) = broadcast::channel(1);
        in_flight.insert(subject.clone(), first.clone());
        let guard = InFlightGuard::new(&in_flight, &subject, first);

        // A later leader registers before the first one finishes
        let (second, mut follower) = broadcast::channel(1);
        in_flight.insert(subject.clone(), second.clone());

        guard.complete(Err(CompetencyError::NotFound("s1".into())));

        let registered = in_flight.get(&subject).map(|s| s.same_channel(&second));
        assert_eq!(registered, Some(true));
        second
            .send(Ok(CompetencySnapshot::new("s1", CompetencyScores::default())))
            .unwrap();
        assert!(follower.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_abandoned_leader_clears_own_registration() {
        let in_flight: DashMap<SubjectId, broadcast::Sender<FetchResult>> = DashMap::new();
        let subject = SubjectId::from("s1");

        let (sender, mut follower) = broadcast::channel(1);
        in_flight.insert(subject.clone(), sender.clone());
        drop(InFlightGuard::new(&in_flight, &subject, sender));

        assert!(in_flight.is_empty());
        assert!(matches!(
            follower.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let store = Arc::new(MemoryPersistence::new().with_latency(Duration::from_secs(10)));
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store);

        let err = cache.get(&SubjectId::from("s1")).await.unwrap_err();
        assert_eq!(err, CompetencyError::Timeout(5_000));
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_optimistic_requires_initialized_subject() {
        let cache = cache_with(Arc::new(MemoryPersistence::new()));
        let err = cache.apply_optimistic(&SubjectId::from("s1"), &meeting()).unwrap_err();
        assert!(matches!(err, CompetencyError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_optimistic_then_mark_clean() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store);
        let subject = SubjectId::from("s1");
        cache.get(&subject).await.unwrap();

        let applied = cache.apply_optimistic(&subject, &meeting()).unwrap();
        assert!(cache.entry(&subject).unwrap().is_dirty);
        assert_eq!(cache.dirty_subjects(), vec![subject.clone()]);

        cache.mark_clean(&subject);
        let entry = cache.entry(&subject).unwrap();
        assert!(!entry.is_dirty);
        assert_eq!(entry.snapshot, applied.snapshot);
    }

    #[tokio::test]
    async fn test_mark_synced_ignores_stale_revision() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store);
        let subject = SubjectId::from("s1");
        cache.get(&subject).await.unwrap();

        let first = cache.apply_optimistic(&subject, &meeting()).unwrap();
        cache.apply_optimistic(&subject, &meeting()).unwrap();

        assert!(!cache.mark_synced(&subject, first.revision));
        assert!(cache.entry(&subject).unwrap().is_dirty);
        assert!(cache.mark_synced(&subject, first.revision + 1));
    }

    #[tokio::test]
    async fn test_invalid_mutation_rejected_before_cache() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store);
        let subject = SubjectId::from("s1");
        cache.get(&subject).await.unwrap();

        let input = ActionInput::new("", Category::General, "x", ImpactLevel::Medium);
        let bad = Mutation::RecordAction(input);
        assert!(matches!(
            cache.apply_optimistic(&subject, &bad),
            Err(CompetencyError::Validation(_))
        ));
        assert!(!cache.entry(&subject).unwrap().is_dirty);
    }

    #[tokio::test]
    async fn test_refresh_keeps_dirty_entry() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let cache = cache_with(store.clone());
        let subject = SubjectId::from("s1");
        cache.get(&subject).await.unwrap();

        cache.refresh(&subject).await.unwrap();
        assert_eq!(store.fetch_count(), 2);

        cache.apply_optimistic(&subject, &meeting()).unwrap();
        let snapshot = cache.refresh(&subject).await.unwrap();
        assert_eq!(store.fetch_count(), 2);
        assert_eq!(snapshot.total_points, 100);
    }

    #[tokio::test]
    async fn test_fetch_derives_unlocks() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::new(85.0, 10.0, 10.0)));
        let cache = cache_with(store);

        let snapshot = cache.get(&SubjectId::from("s1")).await.unwrap();
        assert!(snapshot.has_tool(crate::models::Tool::ValueCalculator));
    }
}
