//! Tool unlock predicates

use std::collections::BTreeSet;

use crate::models::{CompetencyScores, CompetencySnapshot, Tool};

/// Whether `tool`'s gating axis has reached `threshold`
pub fn is_unlocked(scores: &CompetencyScores, tool: Tool, threshold: f64) -> bool {
    scores.get(tool.gating_axis()) >= threshold
}

/// Every tool whose predicate holds for `scores`
pub fn unlocked_tools(scores: &CompetencyScores, threshold: f64) -> BTreeSet<Tool> {
    Tool::ALL
        .iter()
        .copied()
        .filter(|tool| is_unlocked(scores, *tool, threshold))
        .collect()
}

/// Merge newly satisfied predicates into the snapshot's unlock set.
///
/// Unlocks are never removed, even if a score later falls below the
/// threshold. Returns the tools unlocked by this call.
pub fn merge_unlocks(snapshot: &mut CompetencySnapshot, threshold: f64) -> Vec<Tool> {
    let mut newly = Vec::new();
    for tool in unlocked_tools(&snapshot.current_scores, threshold) {
        if snapshot.tool_unlocks.insert(tool) {
            newly.push(tool);
        }
    }
    newly
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Axis;

    #[test]
    fn test_threshold_is_inclusive() {
        let scores = CompetencyScores::new(70.0, 69.9, 0.0);
        assert!(is_unlocked(&scores, Tool::ValueCalculator, 70.0));
        assert!(!is_unlocked(&scores, Tool::DealStrategist, 70.0));
    }

    #[test]
    fn test_merge_is_monotonic() {
        let mut snapshot = CompetencySnapshot::new("s1", CompetencyScores::new(72.0, 10.0, 10.0));
        assert_eq!(merge_unlocks(&mut snapshot, 70.0), vec![Tool::ValueCalculator]);

        // Second merge reports nothing new
        assert!(merge_unlocks(&mut snapshot, 70.0).is_empty());

        // A lower score does not revoke
        snapshot.current_scores.set(Axis::ValueCommunication, 40.0);
        merge_unlocks(&mut snapshot, 70.0);
        assert!(snapshot.has_tool(Tool::ValueCalculator));
    }
}
