//! Staff-to-job allocation.
//!
//! Fills named job slots for every activity in a filtered set, one
//! activity at a time in schedule order. One global model over
//! (people × activities × jobs × stations) would be intractable and
//! conflict semantics are most natural per activity, so each activity
//! gets its own build/solve and later activities see earlier commits
//! through the registry.
//!
//! Eligibility excludes anyone competing in the activity, anyone with
//! a time-conflicting assignment (persisted or committed earlier in
//! this run), and anyone the caller marks unavailable. An activity
//! whose eligible pool is smaller than its total headcount is skipped
//! with a warning; the run continues.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use cohort_core::schedule::ActivityId;
use cohort_core::{Activity, Assignment, ConflictIndex, Person, PersonRegistry, RegistrantId, Schedule};
use cohort_solver::LpBackend;

use crate::builder::{ModelSlot, QUEUE_CAP, build_assignment_model};
use crate::error::EngineResult;
use crate::outcome::AllocationOutcome;
use crate::staff_scorer::StaffScorerSet;

/// One labeled job on an activity: a headcount, optional per-station
/// sub-slots, and an eligibility predicate.
pub struct JobSpec {
    pub name: String,
    pub count: u32,
    /// Request per-station sub-slots. Only takes effect when a scorer
    /// cares about stations; otherwise the job stays a single counted
    /// slot and no station numbers are assigned.
    pub stations: bool,
    pub eligible: Box<dyn Fn(&Person) -> bool>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            stations: false,
            eligible: Box::new(|_| true),
        }
    }

    pub fn with_stations(mut self) -> Self {
        self.stations = true;
        self
    }

    pub fn eligible_when(mut self, predicate: impl Fn(&Person) -> bool + 'static) -> Self {
        self.eligible = Box::new(predicate);
        self
    }
}

/// One staffing run over a filtered set of activities.
pub struct StaffConfig {
    pub activity_filter: Box<dyn Fn(&Activity) -> bool>,
    pub jobs: Vec<JobSpec>,
    /// Clear conflicting prior staff assignments on the targeted
    /// activities; without it, pre-existing assignments abort the run
    /// with a warning.
    pub overwrite: bool,
    pub seed: u64,
    /// Caller-supplied unavailability, e.g. "organizers are setting up".
    pub unavailable: Option<Box<dyn Fn(&Person, &Activity) -> bool>>,
    /// Pairs of activities allowed to overlap for the same person.
    pub conflict_exempt: Option<Box<dyn Fn(ActivityId, ActivityId) -> bool>>,
}

impl StaffConfig {
    pub fn new(
        activity_filter: impl Fn(&Activity) -> bool + 'static,
        jobs: Vec<JobSpec>,
        seed: u64,
    ) -> Self {
        Self {
            activity_filter: Box::new(activity_filter),
            jobs,
            overwrite: false,
            seed,
            unavailable: None,
            conflict_exempt: None,
        }
    }
}

/// The staff allocator borrows the registry mutably for one run and
/// commits assignments activity by activity.
pub struct StaffAllocator<'a, B: LpBackend> {
    registry: &'a mut PersonRegistry,
    schedule: &'a Schedule,
    conflicts: &'a ConflictIndex,
    backend: &'a B,
    scorers: StaffScorerSet,
}

impl<'a, B: LpBackend> StaffAllocator<'a, B> {
    pub fn new(
        registry: &'a mut PersonRegistry,
        schedule: &'a Schedule,
        conflicts: &'a ConflictIndex,
        backend: &'a B,
        scorers: StaffScorerSet,
    ) -> Self {
        Self {
            registry,
            schedule,
            conflicts,
            backend,
            scorers,
        }
    }

    /// Run one staffing pass.
    pub fn assign(&mut self, config: &StaffConfig) -> EngineResult<AllocationOutcome> {
        let activities: Vec<&Activity> = self
            .schedule
            .leaves()
            .into_iter()
            .filter(|a| (config.activity_filter)(a))
            .collect();
        let mut outcome = AllocationOutcome::default();
        if activities.is_empty() {
            outcome.warn("staffing: no activities match the filter");
            return Ok(outcome);
        }

        let target_ids: HashSet<ActivityId> = activities.iter().map(|a| a.id).collect();
        let existing = self
            .registry
            .iter()
            .flat_map(|p| p.assignments.iter())
            .filter(|a| !a.role.is_competitor() && target_ids.contains(&a.activity))
            .count();
        if existing > 0 {
            if config.overwrite {
                self.registry.clear_assignments_where(|a| {
                    !a.role.is_competitor() && target_ids.contains(&a.activity)
                });
            } else {
                outcome.warn(format!(
                    "staffing: {existing} staff assignments already exist on the targeted \
                     activities; enable overwrite to replace them"
                ));
                return Ok(outcome);
            }
        }

        let mut rng = SmallRng::seed_from_u64(config.seed);
        for activity in &activities {
            staff_activity(
                self.registry,
                self.conflicts,
                self.backend,
                &self.scorers,
                config,
                activity,
                &mut rng,
                &mut outcome,
            )?;
        }

        info!(
            activities = activities.len(),
            placed = outcome.placed,
            warnings = outcome.warnings.len(),
            "staff allocation complete"
        );
        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
fn staff_activity<B: LpBackend>(
    registry: &mut PersonRegistry,
    conflicts: &ConflictIndex,
    backend: &B,
    scorers: &StaffScorerSet,
    config: &StaffConfig,
    activity: &Activity,
    rng: &mut SmallRng,
    outcome: &mut AllocationOutcome,
) -> EngineResult<()> {
    let required: u32 = config.jobs.iter().map(|j| j.count).sum();
    if required == 0 {
        return Ok(());
    }

    let exempt = |a: ActivityId, b: ActivityId| {
        config
            .conflict_exempt
            .as_ref()
            .is_some_and(|f| f(a, b))
    };

    let mut pool: Vec<RegistrantId> = registry
        .iter()
        .filter(|p| {
            if p.competes_in(activity.id) || p.assigned_to(activity.id) {
                return false;
            }
            if config
                .unavailable
                .as_ref()
                .is_some_and(|f| f(p, activity))
            {
                return false;
            }
            let conflicted = p.assignments.iter().any(|a| {
                conflicts.conflict(a.activity, activity.id) && !exempt(a.activity, activity.id)
            });
            if conflicted {
                return false;
            }
            config.jobs.iter().any(|j| (j.eligible)(p))
        })
        .map(|p| p.registrant_id)
        .collect();
    pool.sort_unstable();

    if (pool.len() as u32) < required {
        outcome.warn(format!(
            "{}: need {} staff, only {} eligible; skipped",
            activity.code,
            required,
            pool.len()
        ));
        return Ok(());
    }

    pool.shuffle(rng);
    pool.truncate(QUEUE_CAP.max(required as usize));

    // Per-station sub-slots only when a scorer can tell them apart.
    let station_slots = scorers.cares_about_stations();
    let mut slots: Vec<ModelSlot> = Vec::new();
    let mut slot_meta: Vec<(usize, Option<u32>)> = Vec::new();
    for (job_index, job) in config.jobs.iter().enumerate() {
        if job.stations && station_slots {
            for station in 1..=job.count {
                slots.push(ModelSlot {
                    key: format!("{}:{}", job.name, station),
                    capacity: 1.0,
                    exact: true,
                });
                slot_meta.push((job_index, Some(station)));
            }
        } else {
            slots.push(ModelSlot {
                key: job.name.clone(),
                capacity: f64::from(job.count),
                exact: true,
            });
            slot_meta.push((job_index, None));
        }
    }

    let co_staff: Vec<RegistrantId> = registry
        .iter()
        .filter(|p| p.assigned_to(activity.id) && !p.competes_in(activity.id))
        .map(|p| p.registrant_id)
        .collect();

    let job_sensitive = scorers.cares_about_jobs() || scorers.cares_about_stations();
    let mut person_memo: std::collections::HashMap<RegistrantId, f64> =
        std::collections::HashMap::new();
    let reg: &PersonRegistry = registry;
    let built = build_assignment_model(
        &pool,
        &slots,
        |person_id, slot_index| {
            let (job_index, station) = slot_meta[slot_index];
            let job = &config.jobs[job_index];
            let person = reg.get(person_id)?;
            if !(job.eligible)(person) {
                return None;
            }
            if !job_sensitive {
                if let Some(value) = person_memo.get(&person_id) {
                    return Some(*value);
                }
            }
            let others: Vec<&Person> = co_staff.iter().filter_map(|id| reg.get(*id)).collect();
            let value = scorers.score(person, activity, &job.name, station, &others);
            if !job_sensitive {
                person_memo.insert(person_id, value);
            }
            Some(value)
        },
        |_| None,
        false,
    );

    let solution = backend.solve(&built.model)?;
    if !solution.feasible {
        outcome.warn(format!(
            "{}: no feasible staff assignment for {} slots over {} eligible people",
            activity.code,
            required,
            pool.len()
        ));
        return Ok(());
    }

    let mut committed = 0usize;
    for name in solution.chosen() {
        let Some((person_id, slot_index)) = built.vars.get(name) else {
            continue;
        };
        let (job_index, station) = slot_meta[*slot_index];
        let job = &config.jobs[job_index];
        registry.commit(*person_id, Assignment::staff(activity.id, &job.name, station))?;
        committed += 1;
    }
    outcome.placed += committed;
    debug!(activity = %activity.code, committed, "activity staffed");
    Ok(())
}
