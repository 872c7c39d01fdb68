//! Forward-looking development plan
//!
//! Picks catalog activities for the axes with the largest gaps and projects
//! what doing them would change. The snapshot is never touched, so a plan is
//! safe to build speculatively.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::catalog::{self, Activity};
use crate::models::{Axis, CompetencyScores, CompetencySnapshot, Tool};
use crate::scoring::{unlocks, Level, ScoringRules};

fn default_max_activities() -> usize {
    5
}

/// Limits on the generated plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    #[serde(default = "default_max_activities")]
    pub max_activities: usize,

    /// Total minutes the plan may take; unbounded when `None`
    #[serde(default)]
    pub time_budget_minutes: Option<u32>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_activities: default_max_activities(),
            time_budget_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedActivity {
    pub activity: Activity,
    pub points: u64,
    pub score_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevelopmentPlan {
    /// Axes the plan targets, largest gap first
    pub focus_axes: Vec<Axis>,
    pub activities: Vec<PlannedActivity>,
    pub total_minutes: u32,
    pub projected_points_gain: u64,
    pub projected_total_points: u64,
    /// Clamped score change per axis
    pub projected_score_deltas: BTreeMap<Axis, f64>,
    pub projected_scores: CompetencyScores,
    /// Tools the plan would unlock that are not unlocked yet
    pub projected_unlocks: Vec<Tool>,
    pub projected_level: Level,
    pub level_up: bool,
}

pub fn development_plan(
    snapshot: &CompetencySnapshot,
    rules: &ScoringRules,
    options: &PlanOptions,
) -> DevelopmentPlan {
    let focus_axes = focus_axes(snapshot, rules);

    let mut activities = Vec::new();
    let mut total_minutes = 0u32;
    for activity in candidates(&focus_axes) {
        if activities.len() >= options.max_activities {
            break;
        }
        let minutes = total_minutes + activity.estimated_minutes;
        if options.time_budget_minutes.is_some_and(|budget| minutes > budget) {
            continue;
        }
        total_minutes = minutes;

        let points = rules.points_for(activity.action_type, activity.impact);
        activities.push(PlannedActivity {
            activity: *activity,
            points,
            score_delta: rules.score_delta_for(points),
        });
    }

    let mut projected_scores = snapshot.current_scores;
    let mut projected_points_gain = 0u64;
    for planned in &activities {
        projected_scores.add(planned.activity.axis, planned.score_delta);
        projected_points_gain += planned.points;
    }

    let projected_score_deltas = Axis::ALL
        .iter()
        .map(|&axis| (axis, projected_scores.get(axis) - snapshot.current_scores.get(axis)))
        .collect();

    let projected_unlocks = unlocks::unlocked_tools(&projected_scores, rules.unlock_threshold())
        .into_iter()
        .filter(|tool| !snapshot.has_tool(*tool))
        .collect();

    let projected_total_points = snapshot.total_points.saturating_add(projected_points_gain);
    let current_level = rules.level_for_points(snapshot.total_points);
    let projected_level = *rules.level_for_points(projected_total_points);

    DevelopmentPlan {
        focus_axes,
        activities,
        total_minutes,
        projected_points_gain,
        projected_total_points,
        projected_score_deltas,
        projected_scores,
        projected_unlocks,
        level_up: projected_level.id != current_level.id,
        projected_level,
    }
}

/// Axes below the unlock threshold by gap, or every axis weakest first when
/// nothing is left to unlock
fn focus_axes(snapshot: &CompetencySnapshot, rules: &ScoringRules) -> Vec<Axis> {
    let threshold = rules.unlock_threshold();
    let mut gaps: Vec<Axis> = Axis::ALL
        .iter()
        .copied()
        .filter(|&axis| snapshot.current_scores.get(axis) < threshold)
        .collect();

    if gaps.is_empty() {
        gaps = Axis::ALL.to_vec();
    }
    gaps.sort_by(|a, b| {
        snapshot
            .current_scores
            .get(*a)
            .total_cmp(&snapshot.current_scores.get(*b))
    });
    gaps
}

/// Catalog activities for the focus axes, one per axis per round
fn candidates(focus_axes: &[Axis]) -> Vec<&'static Activity> {
    let per_axis: Vec<Vec<&'static Activity>> = focus_axes
        .iter()
        .map(|&axis| catalog::activities_for(axis).collect())
        .collect();
    let rounds = per_axis.iter().map(Vec::len).max().unwrap_or(0);

    (0..rounds)
        .flat_map(|round| per_axis.iter().filter_map(move |list| list.get(round).copied()))
        .collect()
}
