//! Insight bundle for a snapshot
//!
//! Everything here is a pure function of the snapshot and the scoring rules.

use serde::Serialize;

use super::catalog;
use crate::models::{Axis, CompetencySnapshot, SubjectId, Tool};
use crate::scoring::{Level, LevelProgress, ScoringRules};

/// Improvement since baseline that earns a positive insight
const NOTABLE_IMPROVEMENT: f64 = 5.0;

/// Level progress at which the next level is called out
const NEAR_LEVEL_PERCENT: f64 = 80.0;

/// Gap thresholds for recommendation priority
const HIGH_PRIORITY_GAP: f64 = 30.0;
const MEDIUM_PRIORITY_GAP: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Positive,
    Opportunity,
    Milestone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub axis: Option<Axis>,
    pub message: String,
}

impl Insight {
    fn new(kind: InsightKind, axis: Option<Axis>, message: String) -> Self {
        Self { kind, axis, message }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn for_gap(gap: f64) -> Self {
        if gap >= HIGH_PRIORITY_GAP {
            Self::High
        } else if gap >= MEDIUM_PRIORITY_GAP {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How to close one axis' gap to its tool unlock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub axis: Axis,
    pub tool: Tool,
    pub gap: f64,
    pub priority: Priority,
    pub activity_id: &'static str,
    pub title: &'static str,
    /// Repetitions of the activity that close the gap
    pub actions_needed: u32,
    pub estimated_minutes: u32,
    pub potential_points: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisImprovement {
    pub axis: Axis,
    pub baseline: f64,
    pub current: f64,
    pub improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightBundle {
    pub subject_id: SubjectId,
    pub total_points: u64,
    pub level: LevelProgress,
    pub improvements: Vec<AxisImprovement>,
    pub weakest_axis: Axis,
    pub insights: Vec<Insight>,
    /// Largest gap first
    pub recommendations: Vec<Recommendation>,
}

pub fn generate(snapshot: &CompetencySnapshot, rules: &ScoringRules) -> InsightBundle {
    let improvements: Vec<AxisImprovement> = Axis::ALL
        .iter()
        .map(|&axis| AxisImprovement {
            axis,
            baseline: snapshot.baseline_scores.get(axis),
            current: snapshot.current_scores.get(axis),
            improvement: snapshot.improvement(axis),
        })
        .collect();

    let weakest_axis = weakest_axis(snapshot);
    let level = rules.level_progress(snapshot.total_points);

    InsightBundle {
        subject_id: snapshot.subject_id.clone(),
        total_points: snapshot.total_points,
        insights: insights(snapshot, rules, &improvements, weakest_axis, &level),
        recommendations: recommendations(snapshot, rules),
        improvements,
        weakest_axis,
        level,
    }
}

/// Lowest current score; ties go to the earlier axis
pub fn weakest_axis(snapshot: &CompetencySnapshot) -> Axis {
    let mut weakest = Axis::ALL[0];
    for axis in Axis::ALL.iter().skip(1) {
        if snapshot.current_scores.get(*axis) < snapshot.current_scores.get(weakest) {
            weakest = *axis;
        }
    }
    weakest
}

fn insights(
    snapshot: &CompetencySnapshot,
    rules: &ScoringRules,
    improvements: &[AxisImprovement],
    weakest: Axis,
    level: &LevelProgress,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    for improvement in improvements.iter().filter(|i| i.improvement >= NOTABLE_IMPROVEMENT) {
        insights.push(Insight::new(
            InsightKind::Positive,
            Some(improvement.axis),
            format!(
                "{} is up {:.0} points since your baseline",
                improvement.axis.label(),
                improvement.improvement
            ),
        ));
    }

    let weakest_score = snapshot.current_scores.get(weakest);
    let threshold = rules.unlock_threshold();
    if weakest_score < threshold {
        insights.push(Insight::new(
            InsightKind::Opportunity,
            Some(weakest),
            format!(
                "{} is your biggest gap: {:.0} points to unlock the {}",
                weakest.label(),
                (threshold - weakest_score).ceil(),
                Tool::for_axis(weakest).label()
            ),
        ));
    }

    for tool in &snapshot.tool_unlocks {
        insights.push(Insight::new(
            InsightKind::Milestone,
            Some(tool.gating_axis()),
            format!("{} unlocked", tool.label()),
        ));
    }

    if level.current.id != Level::initial().id {
        insights.push(Insight::new(
            InsightKind::Milestone,
            None,
            format!("Reached {}", level.current.name),
        ));
    }
    if let Some(next) = &level.next {
        if level.percent >= NEAR_LEVEL_PERCENT {
            insights.push(Insight::new(
                InsightKind::Milestone,
                None,
                format!("{} points to {}", level.points_to_next, next.name),
            ));
        }
    }

    insights
}

/// One recommendation per axis below the unlock threshold, largest gap first
pub fn recommendations(snapshot: &CompetencySnapshot, rules: &ScoringRules) -> Vec<Recommendation> {
    let threshold = rules.unlock_threshold();

    let mut recommendations: Vec<Recommendation> = Axis::ALL
        .iter()
        .filter_map(|&axis| {
            let gap = threshold - snapshot.current_scores.get(axis);
            if gap <= 0.0 {
                return None;
            }

            let activity = catalog::primary_for(axis);
            let points_per_action = rules.points_for(activity.action_type, activity.impact).max(1);
            let points_needed = rules.points_for_score_gap(gap);
            let actions_needed = points_needed.div_ceil(points_per_action).max(1) as u32;

            Some(Recommendation {
                axis,
                tool: Tool::for_axis(axis),
                gap,
                priority: Priority::for_gap(gap),
                activity_id: activity.id,
                title: activity.title,
                actions_needed,
                estimated_minutes: actions_needed * activity.estimated_minutes,
                potential_points: actions_needed as u64 * points_per_action,
            })
        })
        .collect();

    recommendations.sort_by(|a, b| b.gap.total_cmp(&a.gap));
    recommendations
}
