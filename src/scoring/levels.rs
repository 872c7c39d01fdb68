//! Professional levels derived from total points

use serde::Serialize;

/// A professional level with its point floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Level {
    pub id: &'static str,
    pub name: &'static str,
    pub required_points: u64,
}

/// All levels in ascending order of required points
pub const LEVELS: [Level; 5] = [
    Level { id: "foundation", name: "Value Foundation", required_points: 0 },
    Level { id: "practitioner", name: "Value Practitioner", required_points: 1_000 },
    Level { id: "specialist", name: "Value Specialist", required_points: 2_500 },
    Level { id: "strategist", name: "Value Strategist", required_points: 5_000 },
    Level { id: "value_leader", name: "Value Leader", required_points: 10_000 },
];

impl Level {
    /// The entry level every subject starts at
    pub fn initial() -> &'static Level {
        &LEVELS[0]
    }

    pub fn by_id(id: &str) -> Option<&'static Level> {
        LEVELS.iter().find(|level| level.id == id)
    }

    /// Position in the level table (0-based)
    pub fn index(&self) -> usize {
        LEVELS.iter().position(|l| l.id == self.id).unwrap_or(0)
    }

    pub fn is_terminal(&self) -> bool {
        self.index() == LEVELS.len() - 1
    }
}

/// Highest level whose floor is at or below `total_points`
pub fn level_for_points(total_points: u64) -> &'static Level {
    LEVELS
        .iter()
        .rev()
        .find(|level| level.required_points <= total_points)
        .unwrap_or(&LEVELS[0])
}

/// Progress within the current level band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelProgress {
    pub current: Level,
    /// `None` at the terminal level
    pub next: Option<Level>,
    /// 0-100, saturated at 100 on the terminal level
    pub percent: f64,
    pub points_to_next: u64,
}

pub fn level_progress(total_points: u64) -> LevelProgress {
    let current = *level_for_points(total_points);
    let next = LEVELS.get(current.index() + 1).copied();

    match next {
        Some(next) => {
            let band = (next.required_points - current.required_points) as f64;
            let into_band = (total_points - current.required_points) as f64;
            LevelProgress {
                current,
                next: Some(next),
                percent: (into_band / band * 100.0).clamp(0.0, 100.0),
                points_to_next: next.required_points - total_points,
            }
        }
        None => LevelProgress {
            current,
            next: None,
            percent: 100.0,
            points_to_next: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_floors() {
        assert_eq!(level_for_points(0).id, "foundation");
        assert_eq!(level_for_points(999).id, "foundation");
        assert_eq!(level_for_points(1_000).id, "practitioner");
        assert_eq!(level_for_points(2_499).id, "practitioner");
        assert_eq!(level_for_points(10_000).id, "value_leader");
        assert_eq!(level_for_points(u64::MAX).id, "value_leader");
    }

    #[test]
    fn test_exactly_one_level_with_floor_below_points() {
        for points in [0, 1, 500, 1_000, 4_999, 5_000, 9_999, 10_000, 1_000_000] {
            let level = level_for_points(points);
            assert!(level.required_points <= points);
            let higher = LEVELS
                .iter()
                .filter(|l| {
                    l.required_points <= points && l.required_points > level.required_points
                })
                .count();
            assert_eq!(higher, 0);
        }
    }

    #[test]
    fn test_progress_mid_band() {
        let progress = level_progress(1_750);
        assert_eq!(progress.current.id, "practitioner");
        assert_eq!(progress.next.map(|l| l.id), Some("specialist"));
        assert_eq!(progress.points_to_next, 750);
        assert!((progress.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_terminal() {
        let progress = level_progress(25_000);
        assert_eq!(progress.current.id, "value_leader");
        assert!(progress.next.is_none());
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.points_to_next, 0);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(Level::by_id("strategist").map(|l| l.required_points), Some(5_000));
        assert!(Level::initial().index() == 0);
        assert!(Level::by_id("value_leader").unwrap().is_terminal());
    }
}
