//! In-process remote store
//!
//! Keeps snapshots and append logs in memory. Used for offline embedding and
//! as the remote side in tests, where outages, slow links and failing writes
//! can be simulated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{CompetencyError, Result};
use crate::models::{ActionRecord, CompetencySnapshot, SnapshotFields, SubjectId};
use crate::traits::RemotePersistence;

/// Retained actions per subject
const ACTION_LOG_LIMIT: usize = 1_000;

/// In-memory [`RemotePersistence`] implementation
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshots: DashMap<SubjectId, CompetencySnapshot>,
    /// Most recent first
    actions: DashMap<SubjectId, Vec<ActionRecord>>,
    /// Delivered updates in arrival order ("action:<id>", "achievement:<id>")
    deliveries: DashMap<SubjectId, Vec<String>>,
    /// Last reconciling write per subject, as JSON
    last_fields: DashMap<SubjectId, serde_json::Value>,
    latency: Option<Duration>,
    offline: AtomicBool,
    failing_writes: AtomicUsize,
    fetch_count: AtomicU64,
    snapshot_write_count: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store a snapshot as if it already existed remotely
    pub fn seed(&self, snapshot: CompetencySnapshot) {
        self.snapshots.insert(snapshot.subject_id.clone(), snapshot);
    }

    /// Fail every call with a delivery error while offline
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `count` write calls
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn snapshot_write_count(&self) -> u64 {
        self.snapshot_write_count.load(Ordering::SeqCst)
    }

    /// Stored snapshot
    pub fn stored(&self, subject: &SubjectId) -> Option<CompetencySnapshot> {
        self.snapshots.get(subject).map(|s| s.clone())
    }

    /// Appended action records, most recent first
    pub fn actions(&self, subject: &SubjectId) -> Vec<ActionRecord> {
        self.actions.get(subject).map(|a| a.clone()).unwrap_or_default()
    }

    /// Delivered appends in arrival order
    pub fn delivery_log(&self, subject: &SubjectId) -> Vec<String> {
        self.deliveries.get(subject).map(|d| d.clone()).unwrap_or_default()
    }

    /// The last reconciling write for a subject
    pub fn last_fields(&self, subject: &SubjectId) -> Option<serde_json::Value> {
        self.last_fields.get(subject).map(|v| v.clone())
    }

    async fn simulate_link(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(CompetencyError::Delivery("remote store offline".into()));
        }
        Ok(())
    }

    async fn simulate_write(&self) -> Result<()> {
        self.simulate_link().await?;
        let failed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CompetencyError::Delivery("simulated write failure".into()));
        }
        Ok(())
    }

    fn ensure_known(&self, subject: &SubjectId) -> Result<()> {
        if !self.snapshots.contains_key(subject) {
            return Err(CompetencyError::NotFound(subject.to_string()));
        }
        Ok(())
    }

    fn log_delivery(&self, subject: &SubjectId, label: String) {
        self.deliveries.entry(subject.clone()).or_default().push(label);
    }
}

#[async_trait]
impl RemotePersistence for MemoryPersistence {
    async fn fetch_snapshot(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_link().await?;
        self.snapshots
            .get(subject)
            .map(|s| s.clone())
            .ok_or_else(|| CompetencyError::NotFound(subject.to_string()))
    }

    async fn append_action_record(&self, subject: &SubjectId, record: &ActionRecord) -> Result<()> {
        self.simulate_write().await?;
        self.ensure_known(subject)?;

        let mut actions = self.actions.entry(subject.clone()).or_default();
        if actions.iter().any(|a| a.id == record.id) {
            debug!(subject = %subject, action_id = %record.id, "Duplicate action append ignored");
            return Ok(());
        }
        actions.insert(0, record.clone());
        actions.truncate(ACTION_LOG_LIMIT);
        drop(actions);

        self.log_delivery(subject, format!("action:{}", record.id));
        Ok(())
    }

    async fn append_achievement_unlock(
        &self,
        subject: &SubjectId,
        achievement_id: &str,
        bonus_points: u64,
    ) -> Result<()> {
        self.simulate_write().await?;
        self.ensure_known(subject)?;
        debug!(subject = %subject, achievement_id, bonus_points, "Achievement stored");
        self.log_delivery(subject, format!("achievement:{}", achievement_id));
        Ok(())
    }

    async fn write_snapshot_fields(
        &self,
        subject: &SubjectId,
        fields: &SnapshotFields,
    ) -> Result<()> {
        self.simulate_write().await?;

        let recent = self.actions(subject);
        let mut snapshot = self
            .snapshots
            .get_mut(subject)
            .ok_or_else(|| CompetencyError::NotFound(subject.to_string()))?;

        snapshot.current_scores = fields.current_scores;
        snapshot.total_points = fields.total_points;
        snapshot.tool_unlocks = fields.tool_unlocks.clone();
        snapshot.achievement_ids = fields.achievement_ids.clone();
        snapshot.recent_actions = recent.into_iter().collect();
        drop(snapshot);

        self.last_fields.insert(subject.clone(), serde_json::to_value(fields)?);
        self.snapshot_write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_recent_actions(
        &self,
        subject: &SubjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>> {
        self.simulate_link().await?;
        self.ensure_known(subject)?;
        Ok(self
            .actions(subject)
            .into_iter()
            .filter(|a| a.timestamp >= since)
            .collect())
    }
}
