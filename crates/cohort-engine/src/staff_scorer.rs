//! Scorer composition for staff allocation.
//!
//! Like competitor scorers, but parameterized by the job name and an
//! optional station number. The two capability flags let the model
//! builder skip enumeration a scorer is indifferent to: when no scorer
//! cares about stations, jobs are modeled as single counted slots
//! instead of per-station sub-slots, and when no scorer cares about
//! jobs either, a person's score is computed once and reused.

use std::collections::HashMap;

use cohort_core::schedule::ActivityId;
use cohort_core::{Activity, Person, Schedule};

/// A desirability function over a candidate staff placement.
pub trait StaffScorer {
    fn score(
        &self,
        person: &Person,
        activity: &Activity,
        job: &str,
        station: Option<u32>,
        others: &[&Person],
    ) -> f64;

    /// Whether the result depends on which job is being filled.
    fn cares_about_jobs(&self) -> bool {
        false
    }

    /// Whether the result depends on the station number.
    fn cares_about_stations(&self) -> bool {
        false
    }
}

/// A summed combination of staff scorers.
pub struct StaffScorerSet {
    scorers: Vec<Box<dyn StaffScorer>>,
}

impl StaffScorerSet {
    pub fn combine(scorers: Vec<Box<dyn StaffScorer>>) -> Self {
        Self { scorers }
    }

    pub fn empty() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    pub fn cares_about_jobs(&self) -> bool {
        self.scorers.iter().any(|s| s.cares_about_jobs())
    }

    pub fn cares_about_stations(&self) -> bool {
        self.scorers.iter().any(|s| s.cares_about_stations())
    }

    pub fn score(
        &self,
        person: &Person,
        activity: &Activity,
        job: &str,
        station: Option<u32>,
        others: &[&Person],
    ) -> f64 {
        self.scorers
            .iter()
            .map(|s| s.score(person, activity, job, station, others))
            .sum()
    }
}

// ── Built-in staff scorers ─────────────────────────────────────────

/// Balances duty: penalizes people in proportion to the staff
/// assignments they already hold. `weight` is typically negative.
pub struct AssignmentLoadScorer {
    pub weight: f64,
}

impl StaffScorer for AssignmentLoadScorer {
    fn score(
        &self,
        person: &Person,
        _activity: &Activity,
        _job: &str,
        _station: Option<u32>,
        _others: &[&Person],
    ) -> f64 {
        self.weight * person.staff_assignment_count() as f64
    }
}

/// Reads a per-job preference ratio from the extension-property bag
/// (key `job-pref:<job>`, value in 0..=1) and scales it by `weight`.
/// People without the property score neutral.
pub struct JobPreferenceScorer {
    pub weight: f64,
}

impl JobPreferenceScorer {
    fn prop_key(job: &str) -> String {
        format!("job-pref:{job}")
    }
}

impl StaffScorer for JobPreferenceScorer {
    fn score(
        &self,
        person: &Person,
        _activity: &Activity,
        job: &str,
        _station: Option<u32>,
        _others: &[&Person],
    ) -> f64 {
        person
            .props
            .get_number(&Self::prop_key(job))
            .map_or(0.0, |ratio| self.weight * ratio)
    }

    fn cares_about_jobs(&self) -> bool {
        true
    }
}

/// Bonus for keeping someone on the job they just finished: a judge
/// staying at their table between back-to-back activities beats a
/// swap.
pub struct ContinuityScorer {
    bonus: f64,
    ends: HashMap<ActivityId, i64>,
}

impl ContinuityScorer {
    pub fn new(schedule: &Schedule, bonus: f64) -> Self {
        let ends = schedule
            .all_activities()
            .iter()
            .map(|a| (a.id, a.end))
            .collect();
        Self { bonus, ends }
    }
}

impl StaffScorer for ContinuityScorer {
    fn score(
        &self,
        person: &Person,
        activity: &Activity,
        job: &str,
        _station: Option<u32>,
        _others: &[&Person],
    ) -> f64 {
        let continues = person.assignments.iter().any(|a| {
            a.role.job() == Some(job)
                && self.ends.get(&a.activity) == Some(&activity.start)
        });
        if continues { self.bonus } else { 0.0 }
    }

    fn cares_about_jobs(&self) -> bool {
        true
    }
}
