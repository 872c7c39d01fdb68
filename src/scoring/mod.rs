//! Scoring rules
//!
//! Pure functions mapping actions to points, points to levels and score
//! deltas, and scores to tool unlocks. [`ScoringRules`] binds them to an
//! injectable [`ScoringPolicy`] and applies mutations to snapshots.

pub mod levels;
pub mod milestones;
pub mod points;
pub mod unlocks;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringPolicy;
use crate::models::{
    ActionInput, ActionRecord, CompetencyScores, CompetencySnapshot, ImpactLevel, SnapshotFields,
    Tool,
};

pub use levels::{level_for_points, level_progress, Level, LevelProgress, LEVELS};
pub use milestones::{milestones_for_transition, Milestone};
pub use points::action_types;

/// A local change to a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    RecordAction(ActionInput),
    UnlockAchievement {
        achievement_id: String,
        bonus_points: u64,
    },
}

/// What a mutation did to the snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEffect {
    ActionRecorded {
        record: ActionRecord,
        unlocked: Vec<Tool>,
    },
    AchievementUnlocked,
    /// Achievement was already held; the snapshot is untouched
    AchievementAlreadyHeld,
}

impl MutationEffect {
    /// Whether the snapshot changed
    pub fn is_change(&self) -> bool {
        !matches!(self, MutationEffect::AchievementAlreadyHeld)
    }
}

/// Scoring rules bound to a policy
#[derive(Debug, Clone, Default)]
pub struct ScoringRules {
    policy: ScoringPolicy,
}

impl ScoringRules {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn points_for(&self, action_type: &str, impact: ImpactLevel) -> u64 {
        points::points_for(action_type, impact, self.policy.default_base_points)
    }

    pub fn level_for_points(&self, total_points: u64) -> &'static Level {
        levels::level_for_points(total_points)
    }

    pub fn level_progress(&self, total_points: u64) -> LevelProgress {
        levels::level_progress(total_points)
    }

    /// Competency score delta for a point delta (unclamped)
    pub fn score_delta_for(&self, points: u64) -> f64 {
        points as f64 / self.policy.points_per_score_point as f64
    }

    /// Points needed to raise an axis score by `score_gap`
    pub fn points_for_score_gap(&self, score_gap: f64) -> u64 {
        if score_gap <= 0.0 {
            return 0;
        }
        (score_gap * self.policy.points_per_score_point as f64).ceil() as u64
    }

    pub fn unlock_threshold(&self) -> f64 {
        self.policy.unlock_threshold
    }

    pub fn is_tool_unlocked(&self, scores: &CompetencyScores, tool: Tool) -> bool {
        unlocks::is_unlocked(scores, tool, self.policy.unlock_threshold)
    }

    /// Apply a mutation in place, recomputing everything derived from it
    pub fn apply(
        &self,
        snapshot: &mut CompetencySnapshot,
        mutation: &Mutation,
        now: DateTime<Utc>,
    ) -> MutationEffect {
        match mutation {
            Mutation::RecordAction(input) => {
                let (record, unlocked) = self.apply_action(snapshot, input, now);
                MutationEffect::ActionRecorded { record, unlocked }
            }
            Mutation::UnlockAchievement {
                achievement_id,
                bonus_points,
            } => {
                if self.apply_bonus(snapshot, achievement_id, *bonus_points) {
                    MutationEffect::AchievementUnlocked
                } else {
                    MutationEffect::AchievementAlreadyHeld
                }
            }
        }
    }

    /// Record an action: award points, move its axis, refresh unlocks and
    /// push it onto the bounded recent list.
    pub fn apply_action(
        &self,
        snapshot: &mut CompetencySnapshot,
        input: &ActionInput,
        now: DateTime<Utc>,
    ) -> (ActionRecord, Vec<Tool>) {
        let points = self.points_for(&input.action_type, input.impact_level);
        let record = ActionRecord::accept(input, points, now);

        snapshot.total_points = snapshot.total_points.saturating_add(points);
        if let Some(axis) = input.category.axis() {
            snapshot.current_scores.add(axis, self.score_delta_for(points));
        }

        snapshot.recent_actions.push_front(record.clone());
        snapshot.recent_actions.truncate(self.policy.recent_action_limit);

        let unlocked = unlocks::merge_unlocks(snapshot, self.policy.unlock_threshold);
        (record, unlocked)
    }

    /// Insert an achievement and its bonus. Returns false if already held.
    pub fn apply_bonus(
        &self,
        snapshot: &mut CompetencySnapshot,
        achievement_id: &str,
        bonus_points: u64,
    ) -> bool {
        if !snapshot.achievement_ids.insert(achievement_id.to_string()) {
            return false;
        }
        snapshot.total_points = snapshot.total_points.saturating_add(bonus_points);
        true
    }

    /// Milestones earned by moving from `points_before` to the snapshot's
    /// total and newly unlocking `unlocked`
    pub fn milestones_for_transition(
        &self,
        snapshot: &CompetencySnapshot,
        points_before: u64,
        unlocked: &[Tool],
    ) -> Vec<Milestone> {
        if !self.policy.auto_milestones {
            return Vec::new();
        }
        milestones::milestones_for_transition(snapshot, points_before, unlocked)
    }

    /// Fields for the reconciling write
    pub fn snapshot_fields(&self, snapshot: &CompetencySnapshot) -> SnapshotFields {
        SnapshotFields {
            current_scores: snapshot.current_scores,
            total_points: snapshot.total_points,
            level: self.level_for_points(snapshot.total_points).id.to_string(),
            tool_unlocks: snapshot.tool_unlocks.clone(),
            achievement_ids: snapshot.achievement_ids.clone(),
        }
    }
}
