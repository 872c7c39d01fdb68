//! Competency service - the surface offered to the presentation layer
//!
//! Wires the progress cache, update queue and sync loop together over one
//! [`RemotePersistence`]. Writes are optimistic and never wait on the
//! network; reads go through the cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use elohim_competency::{
//!     ActionInput, Category, CompetencyConfig, CompetencyService, ImpactLevel, SubjectId,
//! };
//!
//! let service = CompetencyService::new(CompetencyConfig::default(), remote)?;
//! service.start_sync();
//!
//! let subject = SubjectId::from("agent-42");
//! service.initialize(&subject).await?;
//!
//! let outcome = service.record_action(
//!     &subject,
//!     ActionInput::new(
//!         "customer_meeting",
//!         Category::ValueCommunication,
//!         "Discovery call",
//!         ImpactLevel::Medium,
//!     ),
//! )?;
//! assert_eq!(outcome.points_awarded, 100);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, PendingUpdate, ProgressCache, UpdateQueue};
use crate::config::CompetencyConfig;
use crate::error::{CompetencyError, Result};
use crate::insights::{self, DevelopmentPlan, InsightBundle, PlanOptions};
use crate::models::{ActionInput, ActionRecord, CompetencySnapshot, SubjectId, Tool};
use crate::scoring::{Level, LevelProgress, Mutation, MutationEffect, ScoringRules};
use crate::sync::{SyncLoop, SyncReport};
use crate::traits::{ErrorSink, RemotePersistence, TracingErrorSink};

/// Result of recording an action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub points_awarded: u64,
    pub record: ActionRecord,
    /// Snapshot after the action and any milestones it triggered
    pub snapshot: CompetencySnapshot,
    pub level: Level,
    /// Tools this action unlocked
    pub unlocked_tools: Vec<Tool>,
    /// Milestone achievements awarded because of this action
    pub new_achievements: Vec<String>,
}

/// Result of unlocking an achievement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AchievementOutcome {
    AlreadyUnlocked,
    Unlocked { snapshot: CompetencySnapshot },
}

impl AchievementOutcome {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, AchievementOutcome::Unlocked { .. })
    }
}

/// Competency tracking for any number of subjects
pub struct CompetencyService {
    config: CompetencyConfig,
    remote: Arc<dyn RemotePersistence>,
    cache: Arc<ProgressCache>,
    queue: Arc<UpdateQueue>,
    sync: Arc<SyncLoop>,
}

impl CompetencyService {
    /// Create a service that reports dropped updates through `tracing`
    pub fn new(config: CompetencyConfig, remote: Arc<dyn RemotePersistence>) -> Result<Self> {
        Self::with_error_sink(config, remote, Arc::new(TracingErrorSink))
    }

    pub fn with_error_sink(
        config: CompetencyConfig,
        remote: Arc<dyn RemotePersistence>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        config.validate()?;

        let rules = ScoringRules::new(config.scoring.clone());
        let cache = Arc::new(ProgressCache::new(
            Arc::clone(&remote),
            rules,
            config.cache.freshness(),
            config.sync.remote_timeout(),
        ));
        let queue = Arc::new(UpdateQueue::new());
        let sync = Arc::new(SyncLoop::new(
            Arc::clone(&cache),
            Arc::clone(&queue),
            Arc::clone(&remote),
            sink,
            config.sync.clone(),
        ));

        info!(
            sync_interval_ms = config.sync.interval_ms,
            max_attempts = config.sync.max_attempts,
            "CompetencyService created"
        );

        Ok(Self {
            config,
            remote,
            cache,
            queue,
            sync,
        })
    }

    pub fn config(&self) -> &CompetencyConfig {
        &self.config
    }

    pub fn rules(&self) -> &ScoringRules {
        self.cache.rules()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load a subject into the cache. `NotFound` and delivery failures are
    /// returned as-is.
    pub async fn initialize(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        let snapshot = self.cache.get(subject).await?;
        debug!(subject = %subject, total_points = snapshot.total_points, "Subject initialized");
        Ok(snapshot)
    }

    pub async fn get_insights(&self, subject: &SubjectId) -> Result<InsightBundle> {
        let snapshot = self.cache.get(subject).await?;
        Ok(insights::generate(&snapshot, self.rules()))
    }

    pub async fn development_plan(
        &self,
        subject: &SubjectId,
        options: &PlanOptions,
    ) -> Result<DevelopmentPlan> {
        let snapshot = self.cache.get(subject).await?;
        Ok(insights::development_plan(&snapshot, self.rules(), options))
    }

    pub async fn level_progress(&self, subject: &SubjectId) -> Result<LevelProgress> {
        let snapshot = self.cache.get(subject).await?;
        Ok(self.rules().level_progress(snapshot.total_points))
    }

    /// Actions at or after `since`, most recent first.
    ///
    /// Queries the remote store and adds cached actions it has not seen yet.
    pub async fn recent_activity(
        &self,
        subject: &SubjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>> {
        let timeout = self.config.sync.remote_timeout();
        let query = self.remote.query_recent_actions(subject, since);
        let mut actions = tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| CompetencyError::Timeout(timeout.as_millis() as u64))??;

        if let Some(cached) = self.cache.peek(subject) {
            let known: HashSet<String> = actions.iter().map(|a| a.id.clone()).collect();
            actions.extend(
                cached
                    .recent_actions
                    .into_iter()
                    .filter(|a| a.timestamp >= since && !known.contains(&a.id)),
            );
        }

        actions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(actions)
    }

    /// Force a remote read; refused (returns the cached copy) for dirty entries
    pub async fn refresh(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        self.cache.refresh(subject).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record an action optimistically. Never waits on the network.
    ///
    /// Milestones the action earns are awarded right after it and queued
    /// behind it.
    pub fn record_action(&self, subject: &SubjectId, input: ActionInput) -> Result<RecordOutcome> {
        let applied = self.cache.apply_optimistic(subject, &Mutation::RecordAction(input))?;
        let MutationEffect::ActionRecorded { record, unlocked } = applied.effect else {
            return Err(CompetencyError::Validation(format!(
                "action for {} was not recorded",
                subject
            )));
        };
        self.queue.enqueue(subject, PendingUpdate::action(record.clone()));

        let mut snapshot = applied.snapshot;
        let points_before = snapshot.total_points.saturating_sub(record.points_awarded);
        let new_achievements =
            self.award_milestones(subject, &mut snapshot, points_before, &unlocked)?;
        let level = *self.rules().level_for_points(snapshot.total_points);

        debug!(
            subject = %subject,
            action_type = %record.action_type,
            points = record.points_awarded,
            total_points = snapshot.total_points,
            "Action recorded"
        );

        Ok(RecordOutcome {
            points_awarded: record.points_awarded,
            record,
            snapshot,
            level,
            unlocked_tools: unlocked,
            new_achievements,
        })
    }

    /// Unlock an achievement optimistically. Unlocking one already held is
    /// not an error and queues nothing.
    pub fn unlock_achievement(
        &self,
        subject: &SubjectId,
        achievement_id: &str,
        bonus_points: u64,
    ) -> Result<AchievementOutcome> {
        let mutation = Mutation::UnlockAchievement {
            achievement_id: achievement_id.to_string(),
            bonus_points,
        };
        let applied = self.cache.apply_optimistic(subject, &mutation)?;

        match applied.effect {
            MutationEffect::AchievementUnlocked => {
                self.queue
                    .enqueue(subject, PendingUpdate::achievement(achievement_id, bonus_points));
                debug!(subject = %subject, achievement_id, bonus_points, "Achievement unlocked");
                Ok(AchievementOutcome::Unlocked {
                    snapshot: applied.snapshot,
                })
            }
            _ => Ok(AchievementOutcome::AlreadyUnlocked),
        }
    }

    /// Award the milestones a transition earned. Level bonuses can cross
    /// further levels, so each round checks the move the previous round made.
    fn award_milestones(
        &self,
        subject: &SubjectId,
        snapshot: &mut CompetencySnapshot,
        points_before: u64,
        unlocked: &[Tool],
    ) -> Result<Vec<String>> {
        let mut awarded = Vec::new();
        let mut pending = self
            .rules()
            .milestones_for_transition(snapshot, points_before, unlocked);

        while !pending.is_empty() {
            let round_start = snapshot.total_points;
            for milestone in pending {
                let mutation = Mutation::UnlockAchievement {
                    achievement_id: milestone.achievement_id.clone(),
                    bonus_points: milestone.bonus_points,
                };
                let applied = self.cache.apply_optimistic(subject, &mutation)?;
                if applied.effect == MutationEffect::AchievementUnlocked {
                    self.queue.enqueue(
                        subject,
                        PendingUpdate::achievement(
                            milestone.achievement_id.clone(),
                            milestone.bonus_points,
                        ),
                    );
                    awarded.push(milestone.achievement_id);
                }
                *snapshot = applied.snapshot;
            }
            pending = self
                .rules()
                .milestones_for_transition(snapshot, round_start, &[]);
        }

        Ok(awarded)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Run one sync cycle now
    pub async fn sync_now(&self) -> SyncReport {
        self.sync.tick().await
    }

    pub fn start_sync(&self) {
        self.sync.start();
    }

    pub fn stop_sync(&self) {
        self.sync.stop();
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_running()
    }

    /// Stop the background loop and flush what can be flushed
    pub async fn shutdown(&self) -> SyncReport {
        let report = self.sync.shutdown().await;
        let stats = self.get_cache_stats();
        if stats.pending_update_count > 0 || stats.dirty_entry_count > 0 {
            warn!(
                pending = stats.pending_update_count,
                dirty = stats.dirty_entry_count,
                "Shut down with unsynced changes"
            );
        }
        report
    }

    // =========================================================================
    // Status and Maintenance
    // =========================================================================

    /// Counters across cache, queue and sync loop. Read-only.
    pub fn get_cache_stats(&self) -> CacheStats {
        CacheStats {
            cached_subjects: self.cache.len(),
            pending_update_count: self.queue.pending_count(),
            dirty_entry_count: self.cache.dirty_count(),
            in_flight_fetches: self.cache.in_flight_count(),
            dropped_updates: self.sync.dropped_updates(),
        }
    }

    /// Cached entry with its sync bookkeeping
    pub fn cache_entry(&self, subject: &SubjectId) -> Option<CacheEntry> {
        self.cache.entry(subject)
    }

    pub fn pending_updates(&self, subject: &SubjectId) -> usize {
        self.queue.len(subject)
    }

    /// Drop every cached snapshot and pending update.
    ///
    /// Warning: anything not yet synced is lost.
    pub fn clear_cache(&self) {
        let pending = self.queue.pending_count();
        self.queue.clear();
        self.cache.clear();
        if pending > 0 {
            warn!(pending, "Pending updates discarded with cache clear");
        }
    }
}
