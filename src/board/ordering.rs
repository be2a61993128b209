use std::cmp::Ordering;
use super::mission::{Mission, MissionSource, RankedMission};

fn source_rank(source: MissionSource) -> u8 {
    match source {
        MissionSource::Viewer => 0,
        MissionSource::System => 1,
    }
}

/// Claim order: viewer before system, then priority (high first), then tip
/// amount for viewer pairs (largest first), then most recently updated.
pub fn compare_missions(a: &Mission, b: &Mission) -> Ordering {
    source_rank(a.source)
        .cmp(&source_rank(b.source))
        .then_with(|| b.priority.rank().cmp(&a.priority.rank()))
        .then_with(|| {
            if a.source == MissionSource::Viewer && b.source == MissionSource::Viewer {
                b.tip_value().total_cmp(&a.tip_value())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// Stable in-place sort by [`compare_missions`].
pub fn sort_missions(missions: &mut [Mission]) {
    missions.sort_by(compare_missions);
}

/// Sort and number the given missions, starting at rank 1.
pub fn rank_missions(mut missions: Vec<Mission>) -> Vec<RankedMission> {
    sort_missions(&mut missions);
    missions
        .into_iter()
        .enumerate()
        .map(|(index, mission)| RankedMission { mission, rank: index + 1 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::mission::{normalize_mission, MissionDraft, Priority};
    use chrono::{Duration, Utc};

    fn mission(task: &str, source: MissionSource, priority: Priority, amount: &str, age_secs: i64) -> Mission {
        let now = Utc::now() - Duration::seconds(age_secs);
        let mut draft = MissionDraft::new(task).with_priority(priority);
        draft.amount = Some(amount.into());
        normalize_mission(draft, source, now).unwrap()
    }

    #[test]
    fn test_viewer_outranks_priority() {
        let system = mission("mine 10 iron", MissionSource::System, Priority::High, "0", 0);
        let viewer = mission("build arena", MissionSource::Viewer, Priority::Normal, "5", 0);
        let ranked = rank_missions(vec![system, viewer]);
        assert_eq!(ranked[0].mission.task, "build arena");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn test_priority_then_amount_then_recency() {
        let list = vec![
            mission("low", MissionSource::Viewer, Priority::Low, "100", 0),
            mission("normal-small", MissionSource::Viewer, Priority::Normal, "1", 0),
            mission("normal-big", MissionSource::Viewer, Priority::Normal, "9.5", 0),
            mission("normal-big-older", MissionSource::Viewer, Priority::Normal, "9.5", 60),
            mission("high", MissionSource::Viewer, Priority::High, "0", 0),
        ];
        let tasks: Vec<String> = rank_missions(list).into_iter().map(|r| r.mission.task).collect();
        assert_eq!(tasks, vec!["high", "normal-big", "normal-big-older", "normal-small", "low"]);
    }

    #[test]
    fn test_amount_ignored_for_system() {
        let older = mission("older", MissionSource::System, Priority::Normal, "0", 30);
        let newer = mission("newer", MissionSource::System, Priority::Normal, "0", 0);
        let tasks: Vec<String> = rank_missions(vec![older, newer]).into_iter().map(|r| r.mission.task).collect();
        assert_eq!(tasks, vec!["newer", "older"]);
    }
}
