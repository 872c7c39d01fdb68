//! Data model for competency snapshots and action records
//!
//! Snapshots are plain data. Everything derived from them (level, unlock
//! predicates, insights) is recomputed by [`crate::scoring::ScoringRules`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::error::{CompetencyError, Result};

// ============================================================================
// Identity
// ============================================================================

/// Opaque subject identity, assigned by the caller at session start
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Competency axes
// ============================================================================

/// The three scored competency dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    ValueCommunication,
    SalesStrategy,
    ExecutivePresence,
}

impl Axis {
    /// All axes in display order
    pub const ALL: [Axis; 3] = [
        Axis::ValueCommunication,
        Axis::SalesStrategy,
        Axis::ExecutivePresence,
    ];

    /// Parse from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "value_communication" | "valuecommunication" => Some(Self::ValueCommunication),
            "sales_strategy" | "salesstrategy" => Some(Self::SalesStrategy),
            "executive_presence" | "executivepresence" => Some(Self::ExecutivePresence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueCommunication => "value_communication",
            Self::SalesStrategy => "sales_strategy",
            Self::ExecutivePresence => "executive_presence",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueCommunication => "Value Communication",
            Self::SalesStrategy => "Sales Strategy",
            Self::ExecutivePresence => "Executive Presence",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recorded action: one axis, or general activity that earns
/// points without moving any score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ValueCommunication,
    SalesStrategy,
    ExecutivePresence,
    General,
}

impl Category {
    pub fn axis(&self) -> Option<Axis> {
        match self {
            Self::ValueCommunication => Some(Axis::ValueCommunication),
            Self::SalesStrategy => Some(Axis::SalesStrategy),
            Self::ExecutivePresence => Some(Axis::ExecutivePresence),
            Self::General => None,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("general") {
            return Some(Self::General);
        }
        Axis::from_str(s).map(Self::from)
    }
}

impl From<Axis> for Category {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::ValueCommunication => Self::ValueCommunication,
            Axis::SalesStrategy => Self::SalesStrategy,
            Axis::ExecutivePresence => Self::ExecutivePresence,
        }
    }
}

/// Ordinal severity of an action's impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    #[serde(alias = "low")]
    Standard,
    #[serde(alias = "significant")]
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    /// Point multiplier applied to the action's base value
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Standard => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.5,
            Self::Critical => 2.0,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" | "low" => Some(Self::Standard),
            "medium" | "significant" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Default for ImpactLevel {
    fn default() -> Self {
        Self::Medium
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Upper bound of every axis score
pub const MAX_SCORE: f64 = 100.0;

/// One bounded score per axis. Setters clamp into `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompetencyScores {
    pub value_communication: f64,
    pub sales_strategy: f64,
    pub executive_presence: f64,
}

impl CompetencyScores {
    pub fn new(value_communication: f64, sales_strategy: f64, executive_presence: f64) -> Self {
        Self {
            value_communication,
            sales_strategy,
            executive_presence,
        }
        .clamped()
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::ValueCommunication => self.value_communication,
            Axis::SalesStrategy => self.sales_strategy,
            Axis::ExecutivePresence => self.executive_presence,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        let value = clamp_score(value);
        match axis {
            Axis::ValueCommunication => self.value_communication = value,
            Axis::SalesStrategy => self.sales_strategy = value,
            Axis::ExecutivePresence => self.executive_presence = value,
        }
    }

    /// Add a delta to one axis, clamped
    pub fn add(&mut self, axis: Axis, delta: f64) {
        self.set(axis, self.get(axis) + delta);
    }

    pub fn clamped(self) -> Self {
        Self {
            value_communication: clamp_score(self.value_communication),
            sales_strategy: clamp_score(self.sales_strategy),
            executive_presence: clamp_score(self.executive_presence),
        }
    }

    /// Mean of the three axes
    pub fn average(&self) -> f64 {
        Axis::ALL.iter().map(|a| self.get(*a)).sum::<f64>() / Axis::ALL.len() as f64
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_SCORE)
}

// ============================================================================
// Tools
// ============================================================================

/// Tools gated behind a single axis score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ValueCalculator,
    DealStrategist,
    ExecutiveBriefingKit,
}

impl Tool {
    pub const ALL: [Tool; 3] = [
        Tool::ValueCalculator,
        Tool::DealStrategist,
        Tool::ExecutiveBriefingKit,
    ];

    /// The axis whose score unlocks this tool
    pub fn gating_axis(&self) -> Axis {
        match self {
            Self::ValueCalculator => Axis::ValueCommunication,
            Self::DealStrategist => Axis::SalesStrategy,
            Self::ExecutiveBriefingKit => Axis::ExecutivePresence,
        }
    }

    pub fn for_axis(axis: Axis) -> Self {
        match axis {
            Axis::ValueCommunication => Self::ValueCalculator,
            Axis::SalesStrategy => Self::DealStrategist,
            Axis::ExecutivePresence => Self::ExecutiveBriefingKit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueCalculator => "value_calculator",
            Self::DealStrategist => "deal_strategist",
            Self::ExecutiveBriefingKit => "executive_briefing_kit",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueCalculator => "Value Calculator",
            Self::DealStrategist => "Deal Strategist",
            Self::ExecutiveBriefingKit => "Executive Briefing Kit",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Actions
// ============================================================================

const MAX_ACTION_TYPE_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Caller-supplied description of something the subject did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    pub action_type: String,
    pub category: Category,
    pub description: String,
    #[serde(default)]
    pub impact_level: ImpactLevel,
}

impl ActionInput {
    pub fn new(
        action_type: impl Into<String>,
        category: Category,
        description: impl Into<String>,
        impact_level: ImpactLevel,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            category,
            description: description.into(),
            impact_level,
        }
    }

    /// Reject malformed input before it reaches the cache
    pub fn validate(&self) -> Result<()> {
        if self.action_type.is_empty() {
            return Err(CompetencyError::Validation("action_type required".into()));
        }
        if self.action_type.len() > MAX_ACTION_TYPE_LEN {
            return Err(CompetencyError::Validation(format!(
                "action_type longer than {} characters",
                MAX_ACTION_TYPE_LEN
            )));
        }
        if !self
            .action_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CompetencyError::Validation(format!(
                "action_type '{}' must be snake_case",
                self.action_type
            )));
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(CompetencyError::Validation("description required".into()));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CompetencyError::Validation(format!(
                "description longer than {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(())
    }
}

/// An accepted action. Immutable once created; `points_awarded` is fixed at
/// creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub action_type: String,
    pub category: Category,
    pub description: String,
    pub impact_level: ImpactLevel,
    pub points_awarded: u64,
    pub timestamp: DateTime<Utc>,
    /// Honor system: always true once accepted
    pub verified: bool,
}

impl ActionRecord {
    pub(crate) fn accept(
        input: &ActionInput,
        points_awarded: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type: input.action_type.clone(),
            category: input.category,
            description: input.description.trim().to_string(),
            impact_level: input.impact_level,
            points_awarded,
            timestamp,
            verified: true,
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Per-subject aggregate competency state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencySnapshot {
    pub subject_id: SubjectId,
    pub baseline_scores: CompetencyScores,
    pub current_scores: CompetencyScores,
    pub total_points: u64,
    #[serde(default)]
    pub tool_unlocks: BTreeSet<Tool>,
    #[serde(default)]
    pub achievement_ids: BTreeSet<String>,
    /// Most recent first
    #[serde(default)]
    pub recent_actions: VecDeque<ActionRecord>,
}

impl CompetencySnapshot {
    /// Fresh snapshot whose current scores start at the baseline
    pub fn new(subject_id: impl Into<SubjectId>, baseline: CompetencyScores) -> Self {
        let baseline = baseline.clamped();
        Self {
            subject_id: subject_id.into(),
            baseline_scores: baseline,
            current_scores: baseline,
            total_points: 0,
            tool_unlocks: BTreeSet::new(),
            achievement_ids: BTreeSet::new(),
            recent_actions: VecDeque::new(),
        }
    }

    pub fn with_points(mut self, total_points: u64) -> Self {
        self.total_points = total_points;
        self
    }

    pub fn with_current_scores(mut self, scores: CompetencyScores) -> Self {
        self.current_scores = scores.clamped();
        self
    }

    pub fn has_tool(&self, tool: Tool) -> bool {
        self.tool_unlocks.contains(&tool)
    }

    pub fn has_achievement(&self, achievement_id: &str) -> bool {
        self.achievement_ids.contains(achievement_id)
    }

    /// Improvement of one axis since the baseline assessment
    pub fn improvement(&self, axis: Axis) -> f64 {
        self.current_scores.get(axis) - self.baseline_scores.get(axis)
    }
}

/// Mutable fields pushed by the reconciling write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFields {
    pub current_scores: CompetencyScores,
    pub total_points: u64,
    /// Derived level id at the time of the write
    pub level: String,
    pub tool_unlocks: BTreeSet<Tool>,
    pub achievement_ids: BTreeSet<String>,
}
