//! Remote persistence trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ActionRecord, CompetencySnapshot, SnapshotFields, SubjectId};

/// The remote record store behind the progress cache.
///
/// This is the only component that performs network I/O. Implementations
/// map transport failures to [`CompetencyError::Delivery`] and a missing
/// subject to [`CompetencyError::NotFound`].
///
/// # Example
///
/// ```rust,ignore
/// use elohim_competency::{RemotePersistence, Result};
///
/// struct RestStore { http: reqwest::Client, base_url: String }
///
/// #[async_trait]
/// impl RemotePersistence for RestStore {
///     async fn fetch_snapshot(&self, subject: &SubjectId) -> Result<CompetencySnapshot> {
///         let url = format!("{}/competency/{}", self.base_url, subject);
///         // ...
///     }
///     // ...
/// }
/// ```
///
/// [`CompetencyError::Delivery`]: crate::error::CompetencyError::Delivery
/// [`CompetencyError::NotFound`]: crate::error::CompetencyError::NotFound
#[async_trait]
pub trait RemotePersistence: Send + Sync {
    /// Read the full snapshot for a subject
    async fn fetch_snapshot(&self, subject: &SubjectId) -> Result<CompetencySnapshot>;

    /// Append one accepted action record
    async fn append_action_record(&self, subject: &SubjectId, record: &ActionRecord) -> Result<()>;

    /// Append an achievement unlock with its bonus
    async fn append_achievement_unlock(
        &self,
        subject: &SubjectId,
        achievement_id: &str,
        bonus_points: u64,
    ) -> Result<()>;

    /// Overwrite the snapshot's mutable fields (last writer wins)
    async fn write_snapshot_fields(
        &self,
        subject: &SubjectId,
        fields: &SnapshotFields,
    ) -> Result<()>;

    /// Action records at or after `since`, most recent first
    async fn query_recent_actions(
        &self,
        subject: &SubjectId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionRecord>>;
}
