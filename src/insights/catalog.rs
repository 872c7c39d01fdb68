//! Fixed catalog of development activities

use serde::Serialize;

use crate::models::{Axis, ImpactLevel};
use crate::scoring::action_types;

/// A repeatable activity that earns points on one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Activity {
    pub id: &'static str,
    pub title: &'static str,
    pub axis: Axis,
    /// Action type recorded when the activity is done
    pub action_type: &'static str,
    pub impact: ImpactLevel,
    pub estimated_minutes: u32,
}

/// Activities grouped by axis; the first of each axis is its primary activity
pub const CATALOG: [Activity; 9] = [
    Activity {
        id: "value_prop_workshop",
        title: "Draft a value proposition",
        axis: Axis::ValueCommunication,
        action_type: action_types::VALUE_PROPOSITION,
        impact: ImpactLevel::Medium,
        estimated_minutes: 60,
    },
    Activity {
        id: "roi_model",
        title: "Build an ROI model for an open deal",
        axis: Axis::ValueCommunication,
        action_type: action_types::ROI_ANALYSIS,
        impact: ImpactLevel::High,
        estimated_minutes: 90,
    },
    Activity {
        id: "customer_case_study",
        title: "Write a customer case study",
        axis: Axis::ValueCommunication,
        action_type: action_types::CASE_STUDY,
        impact: ImpactLevel::Medium,
        estimated_minutes: 120,
    },
    Activity {
        id: "stakeholder_map",
        title: "Map the stakeholders of a deal",
        axis: Axis::SalesStrategy,
        action_type: action_types::STAKEHOLDER_MAPPING,
        impact: ImpactLevel::Medium,
        estimated_minutes: 45,
    },
    Activity {
        id: "discovery_meeting",
        title: "Run a discovery meeting",
        axis: Axis::SalesStrategy,
        action_type: action_types::CUSTOMER_MEETING,
        impact: ImpactLevel::Medium,
        estimated_minutes: 60,
    },
    Activity {
        id: "deal_review",
        title: "Peer review a deal strategy",
        axis: Axis::SalesStrategy,
        action_type: action_types::PEER_REVIEW,
        impact: ImpactLevel::Medium,
        estimated_minutes: 30,
    },
    Activity {
        id: "exec_briefing",
        title: "Deliver an executive briefing",
        axis: Axis::ExecutivePresence,
        action_type: action_types::EXECUTIVE_BRIEFING,
        impact: ImpactLevel::High,
        estimated_minutes: 90,
    },
    Activity {
        id: "exec_training",
        title: "Complete executive communication training",
        axis: Axis::ExecutivePresence,
        action_type: action_types::TRAINING_COMPLETED,
        impact: ImpactLevel::Medium,
        estimated_minutes: 120,
    },
    Activity {
        id: "exec_assessment",
        title: "Take an executive presence assessment",
        axis: Axis::ExecutivePresence,
        action_type: action_types::ASSESSMENT_COMPLETED,
        impact: ImpactLevel::Medium,
        estimated_minutes: 60,
    },
];

pub fn activities_for(axis: Axis) -> impl Iterator<Item = &'static Activity> {
    CATALOG.iter().filter(move |activity| activity.axis == axis)
}

/// The activity recommendations are sized against
pub fn primary_for(axis: Axis) -> &'static Activity {
    match axis {
        Axis::ValueCommunication => &CATALOG[0],
        Axis::SalesStrategy => &CATALOG[3],
        Axis::ExecutivePresence => &CATALOG[6],
    }
}

pub fn by_id(id: &str) -> Option<&'static Activity> {
    CATALOG.iter().find(|activity| activity.id == id)
}
