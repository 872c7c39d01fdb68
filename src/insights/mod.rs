//! Read-side insights and development plans
//!
//! Pure functions of a snapshot and the scoring rules. Nothing here mutates
//! the snapshot, so callers can run "what if" previews freely.

pub mod catalog;
mod generator;
mod plan;

pub use catalog::Activity;
pub use generator::{
    generate, recommendations, weakest_axis, AxisImprovement, Insight, InsightBundle, InsightKind,
    Priority, Recommendation,
};
pub use plan::{development_plan, DevelopmentPlan, PlanOptions, PlannedActivity};
