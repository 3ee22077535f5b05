//! Interval-overlap conflict detection.
//!
//! Two activities conflict iff their half-open time intervals overlap.
//! There is no tolerance: a back-to-back pair sharing a boundary
//! instant does not conflict. The index is computed over the *entire*
//! schedule, not just same-event groups, because a person cannot staff
//! two simultaneous activities even in different events.

use std::collections::{HashMap, HashSet};

use crate::schedule::{Activity, ActivityId, Schedule};

/// Half-open overlap test: `[a.start, a.end)` vs `[b.start, b.end)`.
pub fn overlaps(a: &Activity, b: &Activity) -> bool {
    a.start < b.end && b.start < a.end
}

/// Precomputed overlap sets for every activity in a schedule.
pub struct ConflictIndex {
    map: HashMap<ActivityId, HashSet<ActivityId>>,
    empty: HashSet<ActivityId>,
}

impl ConflictIndex {
    /// Build the index by pairwise comparison over the whole tree.
    pub fn build(schedule: &Schedule) -> Self {
        let activities = schedule.all_activities();
        let mut map: HashMap<ActivityId, HashSet<ActivityId>> =
            activities.iter().map(|a| (a.id, HashSet::new())).collect();

        for (i, a) in activities.iter().enumerate() {
            for b in activities.iter().skip(i + 1) {
                if overlaps(a, b) {
                    if let Some(set) = map.get_mut(&a.id) {
                        set.insert(b.id);
                    }
                    if let Some(set) = map.get_mut(&b.id) {
                        set.insert(a.id);
                    }
                }
            }
        }

        Self {
            map,
            empty: HashSet::new(),
        }
    }

    /// All activity ids whose interval overlaps the given activity.
    pub fn conflicts_with(&self, id: ActivityId) -> &HashSet<ActivityId> {
        self.map.get(&id).unwrap_or(&self.empty)
    }

    /// Whether two activities overlap in time.
    pub fn conflict(&self, a: ActivityId, b: ActivityId) -> bool {
        self.conflicts_with(a).contains(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ActivityCode, Room, Venue};

    fn activity(id: ActivityId, start: i64, end: i64) -> Activity {
        Activity {
            id,
            code: ActivityCode::group("333", 1, id),
            name: format!("activity {id}"),
            start,
            end,
            children: Vec::new(),
        }
    }

    fn schedule_of(activities: Vec<Activity>) -> Schedule {
        Schedule {
            venues: vec![Venue {
                id: 1,
                name: "Main".to_string(),
                rooms: vec![Room {
                    id: 1,
                    name: "Hall".to_string(),
                    activities,
                }],
            }],
        }
    }

    #[test]
    fn overlapping_intervals_conflict() {
        assert!(overlaps(&activity(1, 0, 100), &activity(2, 50, 150)));
        assert!(overlaps(&activity(1, 0, 100), &activity(2, 0, 100)));
        assert!(overlaps(&activity(1, 0, 100), &activity(2, 20, 30)));
    }

    #[test]
    fn back_to_back_does_not_conflict() {
        assert!(!overlaps(&activity(1, 0, 100), &activity(2, 100, 200)));
        assert!(!overlaps(&activity(2, 100, 200), &activity(1, 0, 100)));
    }

    #[test]
    fn disjoint_intervals_do_not_conflict() {
        assert!(!overlaps(&activity(1, 0, 100), &activity(2, 150, 200)));
    }

    #[test]
    fn index_covers_whole_schedule() {
        let schedule = schedule_of(vec![
            activity(1, 0, 100),
            activity(2, 50, 150),
            activity(3, 100, 200),
        ]);
        let index = ConflictIndex::build(&schedule);

        assert!(index.conflict(1, 2));
        assert!(index.conflict(2, 3));
        assert!(!index.conflict(1, 3)); // back-to-back
        assert_eq!(index.conflicts_with(2).len(), 2);
    }

    #[test]
    fn index_includes_nested_children() {
        let mut parent = activity(1, 0, 200);
        parent.children.push(activity(2, 0, 100));
        parent.children.push(activity(3, 100, 200));
        let schedule = schedule_of(vec![parent, activity(4, 50, 150)]);
        let index = ConflictIndex::build(&schedule);

        assert!(index.conflict(2, 4));
        assert!(index.conflict(3, 4));
        assert!(!index.conflict(2, 3));
    }

    #[test]
    fn unknown_activity_has_no_conflicts() {
        let schedule = schedule_of(vec![activity(1, 0, 100)]);
        let index = ConflictIndex::build(&schedule);
        assert!(index.conflicts_with(99).is_empty());
    }
}
