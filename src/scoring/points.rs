//! Base point table for recorded actions

use tracing::debug;

use crate::models::ImpactLevel;

/// Known action types and their base point values
pub mod action_types {
    pub const CUSTOMER_MEETING: &str = "customer_meeting";
    pub const VALUE_PROPOSITION: &str = "value_proposition";
    pub const ROI_ANALYSIS: &str = "roi_analysis";
    pub const STAKEHOLDER_MAPPING: &str = "stakeholder_mapping";
    pub const CASE_STUDY: &str = "case_study";
    pub const EXECUTIVE_BRIEFING: &str = "executive_briefing";
    pub const PEER_REVIEW: &str = "peer_review";
    pub const TRAINING_COMPLETED: &str = "training_completed";
    pub const ASSESSMENT_COMPLETED: &str = "assessment_completed";

    /// All action types with their base points
    pub const BASE_POINTS: [(&str, u64); 9] = [
        (CUSTOMER_MEETING, 100),
        (VALUE_PROPOSITION, 150),
        (ROI_ANALYSIS, 120),
        (STAKEHOLDER_MAPPING, 80),
        (CASE_STUDY, 200),
        (EXECUTIVE_BRIEFING, 180),
        (PEER_REVIEW, 60),
        (TRAINING_COMPLETED, 75),
        (ASSESSMENT_COMPLETED, 250),
    ];

    /// Base points for a known action type
    pub fn base_points(action_type: &str) -> Option<u64> {
        BASE_POINTS
            .iter()
            .find(|(name, _)| *name == action_type)
            .map(|(_, points)| *points)
    }

    pub fn is_known(action_type: &str) -> bool {
        base_points(action_type).is_some()
    }
}

/// Points for an action: base value times the impact multiplier, rounded.
///
/// Unknown action types use `fallback_base` instead of failing, so an
/// unrecognised action never blocks the honor-system flow.
pub fn points_for(action_type: &str, impact: ImpactLevel, fallback_base: u64) -> u64 {
    let base = action_types::base_points(action_type).unwrap_or_else(|| {
        debug!(action_type, fallback_base, "Unknown action type, using fallback base points");
        fallback_base
    });
    (base as f64 * impact.multiplier()).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_meeting_medium() {
        assert_eq!(points_for(action_types::CUSTOMER_MEETING, ImpactLevel::Medium, 25), 100);
    }

    #[test]
    fn test_impact_multipliers() {
        assert_eq!(points_for(action_types::CUSTOMER_MEETING, ImpactLevel::Standard, 25), 80);
        assert_eq!(points_for(action_types::CUSTOMER_MEETING, ImpactLevel::High, 25), 150);
        assert_eq!(points_for(action_types::CUSTOMER_MEETING, ImpactLevel::Critical, 25), 200);
    }

    #[test]
    fn test_rounding() {
        // 75 * 0.8 = 60, 75 * 1.5 = 112.5 -> 113
        assert_eq!(points_for(action_types::TRAINING_COMPLETED, ImpactLevel::Standard, 25), 60);
        assert_eq!(points_for(action_types::TRAINING_COMPLETED, ImpactLevel::High, 25), 113);
    }

    #[test]
    fn test_unknown_type_fails_closed() {
        assert_eq!(points_for("interpretive_dance", ImpactLevel::Medium, 25), 25);
        assert_eq!(points_for("interpretive_dance", ImpactLevel::Critical, 25), 50);
    }

    #[test]
    fn test_deterministic_and_non_negative() {
        for (action_type, _) in action_types::BASE_POINTS {
            for impact in [
                ImpactLevel::Standard,
                ImpactLevel::Medium,
                ImpactLevel::High,
                ImpactLevel::Critical,
            ] {
                let first = points_for(action_type, impact, 25);
                assert_eq!(first, points_for(action_type, impact, 25));
                assert!(first > 0);
            }
        }
    }
}
