//! Competitor-to-group allocation.
//!
//! An iterative loop over one round's leaf groups: filter usable
//! groups to those under the current soft size ceiling, build a
//! bounded sub-model over the unplaced queue, solve, commit, repeat.
//! When every group is at the ceiling and the hard maximum has not
//! been reached the ceiling is raised by one; at the hard maximum the
//! pass stops with a warning. A repeated-queue-length check makes the
//! next infeasible solve terminal instead of looping forever on a
//! malformed scorer/model configuration.
//!
//! A pass runs one or more named **assignment sets** in sequence; each
//! set has its own person/group filters and sees earlier sets'
//! placements as fixed. After all sets converge an optional station
//! rule sorts each group's occupants and hands out 1-based stations.

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use cohort_core::schedule::ActivityId;
use cohort_core::{
    Activity, Assignment, ConflictIndex, EventId, Person, PersonRegistry, RegistrantId, Schedule,
};
use cohort_solver::LpBackend;

use crate::builder::{ModelSlot, QUEUE_CAP, build_assignment_model};
use crate::error::EngineResult;
use crate::outcome::AllocationOutcome;
use crate::scorer::{ScoreCache, ScorerSet};

/// A named (person-filter, group-filter) unit within a round's pass.
pub struct AssignmentSet {
    pub name: String,
    pub person_filter: Box<dyn Fn(&Person) -> bool>,
    pub group_filter: Box<dyn Fn(&Activity) -> bool>,
}

impl AssignmentSet {
    pub fn new(
        name: impl Into<String>,
        person_filter: impl Fn(&Person) -> bool + 'static,
        group_filter: impl Fn(&Activity) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            person_filter: Box::new(person_filter),
            group_filter: Box::new(group_filter),
        }
    }

    /// A set covering every registered person and every group.
    pub fn everyone(name: impl Into<String>) -> Self {
        Self::new(name, |_| true, |_| true)
    }
}

/// Sorts each group's occupants and assigns sequential stations.
pub struct StationRule {
    pub descending: bool,
    pub score: Box<dyn Fn(&Person, &Activity) -> f64>,
}

/// One round's allocation request.
pub struct CompetitorConfig {
    pub event: EventId,
    pub round: u32,
    pub sets: Vec<AssignmentSet>,
    /// Hard per-group size limit; the soft ceiling never exceeds it.
    pub hard_max_size: u32,
    /// Clear prior competitor assignments on the round's groups first.
    pub clear_existing: bool,
    pub seed: u64,
    pub station_rule: Option<StationRule>,
}

/// The competitor allocator borrows the registry mutably for one pass
/// and commits placements directly.
pub struct CompetitorAllocator<'a, B: LpBackend> {
    registry: &'a mut PersonRegistry,
    schedule: &'a Schedule,
    conflicts: &'a ConflictIndex,
    backend: &'a B,
    scorers: ScorerSet,
}

impl<'a, B: LpBackend> CompetitorAllocator<'a, B> {
    pub fn new(
        registry: &'a mut PersonRegistry,
        schedule: &'a Schedule,
        conflicts: &'a ConflictIndex,
        backend: &'a B,
        scorers: ScorerSet,
    ) -> Self {
        Self {
            registry,
            schedule,
            conflicts,
            backend,
            scorers,
        }
    }

    /// Run one allocation pass for a round.
    pub fn assign(&mut self, config: &CompetitorConfig) -> EngineResult<AllocationOutcome> {
        let round_groups = self.schedule.groups_for_round(&config.event, config.round)?;
        let mut outcome = AllocationOutcome::default();

        if config.clear_existing {
            let ids: HashSet<ActivityId> = round_groups.iter().map(|g| g.id).collect();
            self.registry
                .clear_assignments_where(|a| a.role.is_competitor() && ids.contains(&a.activity));
        }

        let mut rng = SmallRng::seed_from_u64(config.seed);
        for set in &config.sets {
            run_set(
                self.registry,
                self.conflicts,
                self.backend,
                &self.scorers,
                config,
                set,
                &round_groups,
                &mut rng,
                &mut outcome,
            )?;
        }

        if let Some(rule) = &config.station_rule {
            assign_stations(self.registry, &round_groups, rule);
        }

        info!(
            event = %config.event,
            round = config.round,
            placed = outcome.placed,
            warnings = outcome.warnings.len(),
            "competitor allocation complete"
        );
        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_set<B: LpBackend>(
    registry: &mut PersonRegistry,
    conflicts: &ConflictIndex,
    backend: &B,
    scorers: &ScorerSet,
    config: &CompetitorConfig,
    set: &AssignmentSet,
    round_groups: &[&Activity],
    rng: &mut SmallRng,
    outcome: &mut AllocationOutcome,
) -> EngineResult<()> {
    let groups: Vec<&Activity> = round_groups
        .iter()
        .copied()
        .filter(|g| (set.group_filter)(g))
        .collect();
    if groups.is_empty() {
        outcome.warn(format!("set '{}': no groups match the filter", set.name));
        return Ok(());
    }
    let round_ids: Vec<ActivityId> = round_groups.iter().map(|g| g.id).collect();

    // Unplaced people for this set. People placed by earlier sets (or
    // sticky from the record) already compete somewhere in the round.
    let mut queue: Vec<RegistrantId> = registry
        .iter()
        .filter(|p| p.events.contains(&config.event))
        .filter(|p| (set.person_filter)(p))
        .filter(|p| !round_ids.iter().any(|id| p.competes_in(*id)))
        .map(|p| p.registrant_id)
        .collect();
    queue.sort_unstable();
    if queue.is_empty() {
        return Ok(());
    }

    let mut occupancy: HashMap<ActivityId, u32> = groups
        .iter()
        .map(|g| {
            let count = registry.iter().filter(|p| p.competes_in(g.id)).count() as u32;
            (g.id, count)
        })
        .collect();

    let placed_already: u32 = occupancy.values().sum();
    let mut soft_limit = (queue.len() as u32 + placed_already)
        .div_ceil(groups.len() as u32)
        .min(config.hard_max_size)
        .max(1);

    let mut last_len = usize::MAX;
    let mut stagnant = false;

    while !queue.is_empty() {
        let usable: Vec<&Activity> = groups
            .iter()
            .copied()
            .filter(|g| occupancy.get(&g.id).copied().unwrap_or(0) < soft_limit)
            .collect();
        if usable.is_empty() {
            if soft_limit < config.hard_max_size {
                soft_limit += 1;
                debug!(set = %set.name, soft_limit, "all groups at ceiling, raising");
                continue;
            }
            outcome.warn(format!(
                "set '{}': groups full at hard limit {} with {} people unplaced",
                set.name,
                config.hard_max_size,
                queue.len()
            ));
            break;
        }

        queue.shuffle(rng);
        let window = queue.len().min(QUEUE_CAP);
        let sub_queue = &queue[..window];

        let occupants: HashMap<ActivityId, Vec<RegistrantId>> = usable
            .iter()
            .map(|g| {
                let ids = registry
                    .iter()
                    .filter(|p| p.competes_in(g.id))
                    .map(|p| p.registrant_id)
                    .collect();
                (g.id, ids)
            })
            .collect();
        let slots: Vec<ModelSlot> = usable
            .iter()
            .map(|g| ModelSlot {
                key: g.id.to_string(),
                capacity: f64::from(soft_limit - occupancy.get(&g.id).copied().unwrap_or(0)),
                exact: false,
            })
            .collect();

        let mut cache = ScoreCache::new();
        let reg: &PersonRegistry = registry;
        let built = build_assignment_model(
            sub_queue,
            &slots,
            |person_id, slot_index| {
                let group = usable[slot_index];
                let person = reg.get(person_id)?;
                if person
                    .assignments
                    .iter()
                    .any(|a| conflicts.conflict(a.activity, group.id))
                {
                    return None;
                }
                let others: Vec<&Person> = occupants
                    .get(&group.id)
                    .map(|ids| ids.iter().filter_map(|id| reg.get(*id)).collect())
                    .unwrap_or_default();
                Some(scorers.score(&mut cache, person, group, &others))
            },
            |_| None,
            true,
        );

        if built.vars.is_empty() {
            outcome.warn(format!(
                "set '{}': {} people cannot be placed in any group",
                set.name,
                queue.len()
            ));
            break;
        }

        let solution = backend.solve(&built.model)?;
        if !solution.feasible {
            if stagnant {
                outcome.warn(format!(
                    "set '{}': not converging with {} people unplaced, giving up",
                    set.name,
                    queue.len()
                ));
                break;
            }
            if soft_limit < config.hard_max_size {
                soft_limit += 1;
                continue;
            }
            outcome.warn(format!(
                "set '{}': no feasible assignment at hard limit {}",
                set.name, config.hard_max_size
            ));
            break;
        }

        let mut committed: HashSet<RegistrantId> = HashSet::new();
        for name in solution.chosen() {
            let Some((person_id, slot_index)) = built.vars.get(name) else {
                continue;
            };
            let group = usable[*slot_index];
            let occupied = occupancy.entry(group.id).or_insert(0);
            // Commit only placements that still fit under the ceiling.
            if *occupied < soft_limit {
                registry.commit(*person_id, Assignment::competitor(group.id))?;
                *occupied += 1;
                committed.insert(*person_id);
                outcome.placed += 1;
            }
        }
        queue.retain(|id| !committed.contains(id));
        debug!(
            set = %set.name,
            committed = committed.len(),
            remaining = queue.len(),
            soft_limit,
            "iteration committed"
        );

        stagnant = queue.len() == last_len;
        last_len = queue.len();
        if committed.is_empty() && stagnant && soft_limit >= config.hard_max_size {
            outcome.warn(format!(
                "set '{}': unable to place remaining {} people",
                set.name,
                queue.len()
            ));
            break;
        }
    }

    Ok(())
}

fn assign_stations(registry: &mut PersonRegistry, groups: &[&Activity], rule: &StationRule) {
    for group in groups.iter().copied() {
        let mut members: Vec<(RegistrantId, f64)> = registry
            .iter()
            .filter(|p| p.competes_in(group.id))
            .map(|p| (p.registrant_id, (rule.score)(p, group)))
            .collect();
        members.sort_by(|a, b| {
            let ord = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
            let ord = if rule.descending { ord.reverse() } else { ord };
            ord.then_with(|| a.0.cmp(&b.0))
        });
        for (position, (person_id, _)) in members.iter().enumerate() {
            if let Some(person) = registry.get_mut(*person_id) {
                if let Some(assignment) = person
                    .assignments
                    .iter_mut()
                    .find(|a| a.activity == group.id && a.role.is_competitor())
                {
                    assignment.station = Some(position as u32 + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::schedule::ActivityCode;
    use cohort_core::types::{PersonalBest, PropBag, RecordKind};
    use cohort_core::{Room, Venue};
    use cohort_solver::MicroLp;
    use std::collections::BTreeSet;

    fn person(id: RegistrantId, event: &str) -> Person {
        let mut events = BTreeSet::new();
        events.insert(event.to_string());
        Person {
            registrant_id: id,
            name: format!("Person {id}"),
            country: "US".to_string(),
            birth_date: None,
            events,
            roles: BTreeSet::new(),
            bests: Vec::new(),
            props: PropBag::new(),
            assignments: Vec::new(),
        }
    }

    fn group(id: ActivityId, group_no: u32, start: i64, end: i64) -> Activity {
        Activity {
            id,
            code: ActivityCode::group("333", 1, group_no),
            name: format!("group {group_no}"),
            start,
            end,
            children: Vec::new(),
        }
    }

    fn round_schedule(groups: Vec<Activity>) -> Schedule {
        let round = Activity {
            id: 1000,
            code: ActivityCode::round("333", 1),
            name: "3x3x3 round 1".to_string(),
            start: groups.iter().map(|g| g.start).min().unwrap_or(0),
            end: groups.iter().map(|g| g.end).max().unwrap_or(0),
            children: groups,
        };
        Schedule {
            venues: vec![Venue {
                id: 1,
                name: "Main".to_string(),
                rooms: vec![Room {
                    id: 1,
                    name: "Hall".to_string(),
                    activities: vec![round],
                }],
            }],
        }
    }

    fn config(sets: Vec<AssignmentSet>, hard_max: u32, seed: u64) -> CompetitorConfig {
        CompetitorConfig {
            event: "333".to_string(),
            round: 1,
            sets,
            hard_max_size: hard_max,
            clear_existing: false,
            seed,
            station_rule: None,
        }
    }

    fn group_sizes(registry: &PersonRegistry, ids: &[ActivityId]) -> Vec<usize> {
        ids.iter()
            .map(|id| registry.iter().filter(|p| p.competes_in(*id)).count())
            .collect()
    }

    #[test]
    fn unknown_round_is_a_programmer_error() {
        let schedule = round_schedule(vec![group(1, 1, 0, 3600)]);
        let conflicts = ConflictIndex::build(&schedule);
        let mut registry = PersonRegistry::new();
        let backend = MicroLp;
        let mut allocator = CompetitorAllocator::new(
            &mut registry,
            &schedule,
            &conflicts,
            &backend,
            ScorerSet::empty(),
        );

        let mut cfg = config(vec![AssignmentSet::everyone("all")], 10, 1);
        cfg.event = "444".to_string();
        assert!(allocator.assign(&cfg).is_err());
    }

    #[test]
    fn splits_population_evenly_without_scorers() {
        let schedule = round_schedule(vec![group(1, 1, 0, 3600), group(2, 2, 3600, 7200)]);
        let conflicts = ConflictIndex::build(&schedule);
        let mut registry = PersonRegistry::new();
        for id in 1..=10 {
            registry.insert(person(id, "333")).unwrap();
        }
        let backend = MicroLp;
        let mut allocator = CompetitorAllocator::new(
            &mut registry,
            &schedule,
            &conflicts,
            &backend,
            ScorerSet::empty(),
        );

        let outcome = allocator
            .assign(&config(vec![AssignmentSet::everyone("all")], 25, 42))
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.placed, 10);
        assert_eq!(group_sizes(&registry, &[1, 2]), vec![5, 5]);
    }

    #[test]
    fn time_conflicted_person_lands_in_the_other_group() {
        // An external activity overlapping group 1 only.
        let mut schedule = round_schedule(vec![group(1, 1, 0, 3600), group(2, 2, 3600, 7200)]);
        schedule.venues[0].rooms[0].activities.push(Activity {
            id: 50,
            code: ActivityCode::group("222", 1, 1),
            name: "2x2x2 group".to_string(),
            start: 0,
            end: 3600,
            children: Vec::new(),
        });
        let conflicts = ConflictIndex::build(&schedule);

        let mut registry = PersonRegistry::new();
        for id in 1..=4 {
            registry.insert(person(id, "333")).unwrap();
        }
        registry
            .get_mut(1)
            .unwrap()
            .assignments
            .push(Assignment::competitor(50));

        let backend = MicroLp;
        let mut allocator = CompetitorAllocator::new(
            &mut registry,
            &schedule,
            &conflicts,
            &backend,
            ScorerSet::empty(),
        );
        allocator
            .assign(&config(vec![AssignmentSet::everyone("all")], 4, 7))
            .unwrap();

        assert!(registry.get(1).unwrap().competes_in(2));
        assert!(!registry.get(1).unwrap().competes_in(1));
    }

    #[test]
    fn later_sets_respect_earlier_placements() {
        let schedule = round_schedule(vec![group(1, 1, 0, 3600), group(2, 2, 3600, 7200)]);
        let conflicts = ConflictIndex::build(&schedule);
        let mut registry = PersonRegistry::new();
        for id in 1..=8 {
            let mut p = person(id, "333");
            if id <= 2 {
                p.bests.push(PersonalBest {
                    event: "333".to_string(),
                    kind: RecordKind::Average,
                    value: 500,
                });
            }
            registry.insert(p).unwrap();
        }

        let backend = MicroLp;
        let mut allocator = CompetitorAllocator::new(
            &mut registry,
            &schedule,
            &conflicts,
            &backend,
            ScorerSet::empty(),
        );

        // Seeds go to the last group only, the rest fill both.
        let sets = vec![
            AssignmentSet::new(
                "seeds",
                |p: &Person| p.best("333", RecordKind::Average).is_some(),
                |g: &Activity| g.code.group == Some(2),
            ),
            AssignmentSet::everyone("rest"),
        ];
        let outcome = allocator.assign(&config(sets, 4, 3)).unwrap();

        assert_eq!(outcome.placed, 8);
        assert!(registry.get(1).unwrap().competes_in(2));
        assert!(registry.get(2).unwrap().competes_in(2));
        assert_eq!(group_sizes(&registry, &[1, 2]), vec![4, 4]);
    }

    #[test]
    fn identical_seeds_give_identical_results() {
        let run = |seed: u64| {
            let schedule = round_schedule(vec![group(1, 1, 0, 3600), group(2, 2, 3600, 7200)]);
            let conflicts = ConflictIndex::build(&schedule);
            let mut registry = PersonRegistry::new();
            for id in 1..=9 {
                registry.insert(person(id, "333")).unwrap();
            }
            let backend = MicroLp;
            let mut allocator = CompetitorAllocator::new(
                &mut registry,
                &schedule,
                &conflicts,
                &backend,
                ScorerSet::empty(),
            );
            allocator
                .assign(&config(vec![AssignmentSet::everyone("all")], 5, seed))
                .unwrap();
            registry
                .iter()
                .map(|p| {
                    (
                        p.registrant_id,
                        p.assignments.iter().map(|a| a.activity).collect::<Vec<_>>(),
                    )
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(11), run(11));
    }

    #[test]
    fn station_rule_orders_by_score() {
        let schedule = round_schedule(vec![group(1, 1, 0, 3600)]);
        let conflicts = ConflictIndex::build(&schedule);
        let mut registry = PersonRegistry::new();
        for id in 1..=3 {
            let mut p = person(id, "333");
            p.bests.push(PersonalBest {
                event: "333".to_string(),
                kind: RecordKind::Average,
                value: i64::from(id) * 100, // person 1 fastest
            });
            registry.insert(p).unwrap();
        }

        let backend = MicroLp;
        let mut allocator = CompetitorAllocator::new(
            &mut registry,
            &schedule,
            &conflicts,
            &backend,
            ScorerSet::empty(),
        );
        let mut cfg = config(vec![AssignmentSet::everyone("all")], 10, 5);
        cfg.station_rule = Some(StationRule {
            descending: false,
            score: Box::new(|p: &Person, _g: &Activity| {
                p.best("333", RecordKind::Average).unwrap_or(i64::MAX) as f64
            }),
        });
        allocator.assign(&cfg).unwrap();

        let station_of = |id: RegistrantId| {
            registry.get(id).unwrap().assignments[0]
                .station
                .unwrap()
        };
        assert_eq!(station_of(1), 1);
        assert_eq!(station_of(2), 2);
        assert_eq!(station_of(3), 3);
    }
}
