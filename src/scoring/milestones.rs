//! Milestone achievements awarded automatically
//!
//! Crossing into a level above the initial one, or unlocking a tool, earns a
//! one-off achievement with a bonus. Only the transition a mutation causes
//! counts: a snapshot loaded at a high level or with tools already unlocked
//! earns nothing for them on its next action.

use serde::Serialize;

use super::levels::{level_for_points, LEVELS};
use crate::models::{CompetencySnapshot, Tool};

/// Bonus for reaching a new level
pub const LEVEL_MILESTONE_BONUS: u64 = 100;

/// Bonus for unlocking a tool
pub const TOOL_MILESTONE_BONUS: u64 = 50;

/// An achievement earned by a transition and not yet held
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub achievement_id: String,
    pub bonus_points: u64,
}

pub fn level_achievement_id(level_id: &str) -> String {
    format!("level_{}", level_id)
}

pub fn tool_achievement_id(tool: &str) -> String {
    format!("unlocked_{}", tool)
}

/// Milestones for a move from `points_before` to the snapshot's current total
/// that newly unlocked `unlocked`. Achievements already held are skipped.
pub fn milestones_for_transition(
    snapshot: &CompetencySnapshot,
    points_before: u64,
    unlocked: &[Tool],
) -> Vec<Milestone> {
    let from = level_for_points(points_before).index();
    let to = level_for_points(snapshot.total_points).index();

    let levels = LEVELS
        .iter()
        .take(to + 1)
        .skip(from + 1)
        .map(|level| Milestone {
            achievement_id: level_achievement_id(level.id),
            bonus_points: LEVEL_MILESTONE_BONUS,
        });

    let tools = unlocked.iter().map(|tool| Milestone {
        achievement_id: tool_achievement_id(tool.as_str()),
        bonus_points: TOOL_MILESTONE_BONUS,
    });

    levels
        .chain(tools)
        .filter(|m| !snapshot.has_achievement(&m.achievement_id))
        .collect()
}
