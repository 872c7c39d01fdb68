//! Elohim Competency - scoring and synchronization for professional growth
//!
//! Turns recorded actions into points, levels, competency scores and tool
//! unlocks, and keeps them in a client-side cache that is reconciled with a
//! remote record store under eventual consistency.
//!
//! # Architecture
//!
//! - **Scoring**: pure rules mapping actions to points, points to levels and
//!   score deltas, scores to tool unlocks
//! - **Cache**: per-subject snapshots with optimistic updates, dirty
//!   tracking and single-flight fetches, plus a queue of updates owed to the
//!   remote store
//! - **Sync**: a periodic loop that delivers queued updates in order,
//!   retries failures a bounded number of times and reconciles dirty
//!   snapshots
//! - **Insights**: read-only recommendations and development plans
//!
//! The remote store is abstracted behind [`RemotePersistence`]; the crate
//! ships [`MemoryPersistence`] for offline use and tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use elohim_competency::{CompetencyConfig, CompetencyService, MemoryPersistence};
//!
//! let remote = Arc::new(MemoryPersistence::new());
//! let service = CompetencyService::new(CompetencyConfig::load("competency.toml")?, remote)?;
//! service.start_sync();
//!
//! service.initialize(&subject).await?;
//! let outcome = service.record_action(&subject, input)?;
//! let insights = service.get_insights(&subject).await?;
//!
//! service.shutdown().await;
//! ```

// Scoring rules
pub mod scoring;

// Progress cache and update queue
pub mod cache;

// Background synchronization
pub mod sync;

// Insights and development plans
pub mod insights;

// Remote persistence and error sink seams
pub mod traits;

// Bundled persistence implementations
pub mod persistence;

pub mod config;
pub mod error;
pub mod models;
pub mod service;

// Re-export data model
pub use models::{
    ActionInput, ActionRecord, Axis, Category, CompetencyScores, CompetencySnapshot, ImpactLevel,
    SnapshotFields, SubjectId, Tool,
};

// Re-export scoring types
pub use scoring::{Level, LevelProgress, Mutation, MutationEffect, ScoringRules};

// Re-export cache types
pub use cache::{CacheEntry, CacheStats, PendingUpdate, ProgressCache, UpdateQueue};

// Re-export sync types
pub use sync::{SyncLoop, SyncReport};

// Re-export insight types
pub use insights::{DevelopmentPlan, InsightBundle, InsightKind, PlanOptions};

// Re-export traits and implementations
pub use persistence::MemoryPersistence;
pub use traits::{ErrorSink, RemotePersistence, TracingErrorSink};

pub use config::{CacheConfig, CompetencyConfig, ScoringPolicy, SyncConfig};
pub use error::{CompetencyError, Result};
pub use service::{AchievementOutcome, CompetencyService, RecordOutcome};
