//! Sync loop - delivers pending updates and reconciles dirty snapshots
//!
//! Each tick runs two phases:
//!
//! 1. **Drain**: every subject with pending updates is drained and its
//!    updates delivered in enqueue order. Subjects run concurrently.
//! 2. **Reconcile**: every dirty entry pushes its mutable fields in one
//!    last-writer-wins write, then is marked synced.
//!
//! A failed delivery is retried on a later tick with its attempt counter
//! bumped. Once the failing attempt reaches `max_attempts` the update is
//! dropped and reported to the [`ErrorSink`]. Subjects with a failure in the
//! current tick skip the reconcile phase and stay dirty.

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::{ProgressCache, UpdatePayload, UpdateQueue};
use crate::config::SyncConfig;
use crate::error::{CompetencyError, Result};
use crate::models::SubjectId;
use crate::traits::{ErrorSink, RemotePersistence};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
    pub reconciled: usize,
    pub reconcile_failures: usize,
    pub duration_ms: f64,
}

impl SyncReport {
    /// Nothing was delivered, retried, dropped or reconciled
    pub fn is_idle(&self) -> bool {
        self.delivered == 0
            && self.retried == 0
            && self.dropped == 0
            && self.reconciled == 0
            && self.reconcile_failures == 0
    }
}

#[derive(Debug, Default)]
struct SubjectOutcome {
    delivered: usize,
    retried: usize,
    dropped: usize,
    failed: bool,
}

struct RunningTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic synchronization between the local cache and the remote store
pub struct SyncLoop {
    cache: Arc<ProgressCache>,
    queue: Arc<UpdateQueue>,
    remote: Arc<dyn RemotePersistence>,
    sink: Arc<dyn ErrorSink>,
    config: SyncConfig,
    running: AtomicBool,
    task: Mutex<Option<RunningTask>>,
    /// Held for the duration of a tick
    cycle: tokio::sync::Mutex<()>,
    dropped: AtomicU64,
}

impl SyncLoop {
    pub fn new(
        cache: Arc<ProgressCache>,
        queue: Arc<UpdateQueue>,
        remote: Arc<dyn RemotePersistence>,
        sink: Arc<dyn ErrorSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache,
            queue,
            remote,
            sink,
            config,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            cycle: tokio::sync::Mutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Updates dropped after exhausting their attempts, since construction
    pub fn dropped_updates(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Run one drain + reconcile cycle.
    ///
    /// Never fails: delivery problems are retried, dropped or logged.
    pub async fn tick(&self) -> SyncReport {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();
        let mut report = SyncReport::default();

        let subjects = self.queue.subjects_with_pending();
        let outcomes = join_all(subjects.iter().map(|subject| self.deliver_subject(subject))).await;

        let mut failed = HashSet::new();
        for (subject, outcome) in subjects.iter().zip(outcomes) {
            report.delivered += outcome.delivered;
            report.retried += outcome.retried;
            report.dropped += outcome.dropped;
            if outcome.failed {
                failed.insert(subject.clone());
            }
        }

        let dirty: Vec<SubjectId> = self
            .cache
            .dirty_subjects()
            .into_iter()
            .filter(|subject| {
                let skip = failed.contains(subject);
                if skip {
                    debug!(subject = %subject, "Reconcile deferred, deliveries failed this tick");
                }
                !skip
            })
            .collect();

        for reconciled in join_all(dirty.iter().map(|subject| self.reconcile(subject))).await {
            match reconciled {
                Some(true) => report.reconciled += 1,
                Some(false) => report.reconcile_failures += 1,
                None => {}
            }
        }

        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if !report.is_idle() {
            info!(
                delivered = report.delivered,
                retried = report.retried,
                dropped = report.dropped,
                reconciled = report.reconciled,
                reconcile_failures = report.reconcile_failures,
                duration_ms = report.duration_ms,
                "Sync tick completed"
            );
        }
        report
    }

    /// Deliver one subject's drained updates in order.
    ///
    /// Stops at the first retryable failure and puts the retry plus the
    /// undelivered rest back at the head of the queue.
    async fn deliver_subject(&self, subject: &SubjectId) -> SubjectOutcome {
        let mut outcome = SubjectOutcome::default();
        let mut pending = self.queue.drain(subject).into_iter();

        while let Some(update) = pending.next() {
            let attempt = update.attempt();
            match self.deliver(subject, &update.payload()).await {
                Ok(()) => {
                    debug!(
                        subject = %subject,
                        update = %update.payload(),
                        attempt,
                        "Update delivered"
                    );
                    outcome.delivered += 1;
                }
                Err(err) if attempt >= self.config.max_attempts => {
                    outcome.failed = true;
                    outcome.dropped += 1;
                    self.dropped.fetch_add(1, Ordering::SeqCst);
                    error!(
                        subject = %subject,
                        update = %update.payload(),
                        attempt,
                        error = %err,
                        "Dropping update"
                    );
                    self.sink.report(
                        subject,
                        &CompetencyError::RetryExhausted {
                            subject: subject.to_string(),
                            update: update.payload().to_string(),
                            attempts: attempt,
                        },
                    );
                }
                Err(err) => {
                    outcome.failed = true;
                    outcome.retried += 1;
                    warn!(
                        subject = %subject,
                        update = %update.payload(),
                        attempt,
                        error = %err,
                        "Delivery failed, will retry"
                    );

                    let mut requeue = vec![update.into_retry()];
                    requeue.extend(pending);
                    self.queue.requeue_front(subject, requeue);
                    break;
                }
            }
        }

        outcome
    }

    async fn deliver(&self, subject: &SubjectId, payload: &UpdatePayload) -> Result<()> {
        match payload {
            UpdatePayload::Action(record) => {
                self.bounded(self.remote.append_action_record(subject, record)).await
            }
            UpdatePayload::Achievement {
                achievement_id,
                bonus_points,
            } => {
                let append = self.remote.append_achievement_unlock(
                    subject,
                    achievement_id,
                    *bonus_points,
                );
                self.bounded(append).await
            }
        }
    }

    /// Push a dirty entry's fields. `None` when the entry is no longer dirty.
    async fn reconcile(&self, subject: &SubjectId) -> Option<bool> {
        let (snapshot, revision) = self.cache.snapshot_for_sync(subject)?;
        let fields = self.cache.rules().snapshot_fields(&snapshot);

        match self.bounded(self.remote.write_snapshot_fields(subject, &fields)).await {
            Ok(()) => {
                let clean = self.cache.mark_synced(subject, revision);
                debug!(subject = %subject, revision, clean, "Snapshot reconciled");
                Some(true)
            }
            Err(err) => {
                warn!(
                    subject = %subject,
                    error = %err,
                    "Reconciling write failed, entry stays dirty"
                );
                Some(false)
            }
        }
    }

    /// Apply the remote timeout; a timeout fails like any other delivery
    async fn bounded<F>(&self, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let timeout = self.config.remote_timeout();
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| CompetencyError::Timeout(timeout.as_millis() as u64))?
    }

    // =========================================================================
    // Background Task
    // =========================================================================

    /// Start the periodic background task. Calling it while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync loop already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let sync = Arc::clone(self);
        let interval = self.config.interval();

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Sync loop started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        info!("Sync loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        sync.tick().await;
                    }
                }
            }
        });

        *self.task_slot() = Some(RunningTask { stop: stop_tx, handle });
    }

    /// Stop the background task. An in-progress tick runs to completion.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task_slot().take() {
            // The task may already have exited
            let _ = task.stop.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the background task, wait for it, then run one final tick
    pub async fn shutdown(&self) -> SyncReport {
        self.running.store(false, Ordering::SeqCst);
        let task = self.task_slot().take();
        if let Some(task) = task {
            let _ = task.stop.send(());
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Sync task ended abnormally");
            }
        }

        let report = self.tick().await;
        info!(
            pending = self.queue.pending_count(),
            dirty = self.cache.dirty_count(),
            "Sync loop shut down"
        );
        report
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<RunningTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PendingUpdate;
    use crate::models::{CompetencyScores, CompetencySnapshot};
    use crate::persistence::MemoryPersistence;
    use crate::scoring::ScoringRules;
    use crate::traits::TracingErrorSink;
    use std::time::Duration;

    fn setup(
        store: Arc<MemoryPersistence>,
    ) -> (Arc<SyncLoop>, Arc<ProgressCache>, Arc<UpdateQueue>) {
        let cache = Arc::new(ProgressCache::new(
            store.clone(),
            ScoringRules::default(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        let queue = Arc::new(UpdateQueue::new());
        let sync = Arc::new(SyncLoop::new(
            cache.clone(),
            queue.clone(),
            store,
            Arc::new(TracingErrorSink),
            SyncConfig::default(),
        ));
        (sync, cache, queue)
    }

    #[tokio::test]
    async fn test_idle_tick() {
        let (sync, _, _) = setup(Arc::new(MemoryPersistence::new()));
        assert!(sync.tick().await.is_idle());
    }

    #[tokio::test]
    async fn test_failure_requeues_rest_in_order() {
        let store = Arc::new(MemoryPersistence::new());
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let (sync, _, queue) = setup(store.clone());
        let subject = SubjectId::from("s1");

        queue.enqueue(&subject, PendingUpdate::achievement("a", 1));
        queue.enqueue(&subject, PendingUpdate::achievement("b", 1));
        store.fail_next_writes(1);

        let report = sync.tick().await;
        assert_eq!(report.retried, 1);
        assert_eq!(report.delivered, 0);

        let left = queue.drain(&subject);
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].attempt(), 2);
        assert_eq!(left[1].attempt(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_timeout_counts_as_failure() {
        let store = Arc::new(MemoryPersistence::new().with_latency(Duration::from_secs(30)));
        store.seed(CompetencySnapshot::new("s1", CompetencyScores::default()));
        let (sync, _, queue) = setup(store);
        let subject = SubjectId::from("s1");

        queue.enqueue(&subject, PendingUpdate::achievement("a", 1));
        let report = sync.tick().await;

        assert_eq!(report.retried, 1);
        assert_eq!(queue.len(&subject), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_halts() {
        let (sync, _, _) = setup(Arc::new(MemoryPersistence::new()));

        sync.start();
        sync.start();
        assert!(sync.is_running());

        sync.stop();
        assert!(!sync.is_running());
        sync.stop();
    }
}
