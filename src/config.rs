//! Configuration for the competency engine
//!
//! Every threshold and ratio the scoring rules use lives here so tests and
//! deployments can swap policies without touching the rules themselves.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CompetencyError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetencyConfig {
    #[serde(default)]
    pub scoring: ScoringPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl CompetencyConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CompetencyError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CompetencyError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        if self.sync.max_attempts == 0 {
            return Err(CompetencyError::Config("sync.max_attempts must be at least 1".into()));
        }
        if self.sync.interval_ms == 0 {
            return Err(CompetencyError::Config("sync.interval_ms must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Scoring policy
// ============================================================================

/// Injectable scoring thresholds and ratios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Points that make up one competency score point
    #[serde(default = "default_points_per_score_point")]
    pub points_per_score_point: u64,

    /// Axis score at which the axis' tool unlocks
    #[serde(default = "default_unlock_threshold")]
    pub unlock_threshold: f64,

    /// Retention count for the recent-actions list
    #[serde(default = "default_recent_action_limit")]
    pub recent_action_limit: usize,

    /// Base value for action types missing from the point table
    #[serde(default = "default_base_points")]
    pub default_base_points: u64,

    /// Award level and tool milestones automatically after each action
    #[serde(default = "default_true")]
    pub auto_milestones: bool,
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.points_per_score_point == 0 {
            return Err(CompetencyError::Config(
                "scoring.points_per_score_point must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.unlock_threshold) {
            return Err(CompetencyError::Config(format!(
                "scoring.unlock_threshold {} outside [0, 100]",
                self.unlock_threshold
            )));
        }
        if self.recent_action_limit == 0 {
            return Err(CompetencyError::Config(
                "scoring.recent_action_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            points_per_score_point: default_points_per_score_point(),
            unlock_threshold: default_unlock_threshold(),
            recent_action_limit: default_recent_action_limit(),
            default_base_points: default_base_points(),
            auto_milestones: true,
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a clean entry is served before re-fetching
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sync loop interval in milliseconds
    #[serde(default = "default_sync_interval_ms")]
    pub interval_ms: u64,

    /// Delivery attempts before a pending update is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,

    /// Bound on every remote call in milliseconds
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
}

impl SyncConfig {
    /// Config for dashboards that want changes visible remotely within seconds
    pub fn for_interactive() -> Self {
        Self {
            interval_ms: 5_000,
            max_attempts: 3,
            remote_timeout_ms: 5_000,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sync_interval_ms(),
            max_attempts: default_max_attempts(),
            remote_timeout_ms: default_remote_timeout_ms(),
        }
    }
}

// Defaults
fn default_points_per_score_point() -> u64 {
    10
}

fn default_unlock_threshold() -> f64 {
    70.0
}

fn default_recent_action_limit() -> usize {
    20
}

fn default_base_points() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

fn default_freshness_secs() -> u64 {
    300
}

fn default_sync_interval_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u8 {
    3
}

fn default_remote_timeout_ms() -> u64 {
    10_000
}
