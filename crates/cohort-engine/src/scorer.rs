//! Scorer composition for competitor allocation.
//!
//! A scorer maps a candidate (person, group, co-assigned people) triple
//! to a desirability value: positive encourages, negative discourages,
//! zero is neutral. Scorers compose by summation through `ScorerSet`.
//!
//! Memoization is keyed by (person, group) identity and lives for a
//! single model build — a scorer opts in via `cacheable()` only when
//! its result ignores the dynamic co-assigned set. The cache is never
//! carried across builds, since assignment state changes between them.

use std::collections::HashMap;

use cohort_core::schedule::ActivityId;
use cohort_core::{Activity, Person, RegistrantId, Schedule, StaffRole};

/// A pure desirability function over a candidate placement.
pub trait Scorer {
    fn score(&self, person: &Person, group: &Activity, others: &[&Person]) -> f64;

    /// True when the result is a pure function of (person, group)
    /// identity, independent of `others`. Such results are memoized
    /// within one model build.
    fn cacheable(&self) -> bool {
        false
    }
}

/// Memo table for one model build. Keyed by (scorer position,
/// registrant, activity); dropped before assignment state changes.
#[derive(Debug, Default)]
pub struct ScoreCache(HashMap<(usize, RegistrantId, ActivityId), f64>);

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A summed combination of scorers.
pub struct ScorerSet {
    scorers: Vec<Box<dyn Scorer>>,
}

impl ScorerSet {
    /// Combine scorers into one; the combined score is the sum of all
    /// inputs' scores for the same candidate triple.
    pub fn combine(scorers: Vec<Box<dyn Scorer>>) -> Self {
        Self { scorers }
    }

    pub fn empty() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    pub fn score(
        &self,
        cache: &mut ScoreCache,
        person: &Person,
        group: &Activity,
        others: &[&Person],
    ) -> f64 {
        self.scorers
            .iter()
            .enumerate()
            .map(|(position, scorer)| {
                if scorer.cacheable() {
                    let key = (position, person.registrant_id, group.id);
                    match cache.0.get(&key) {
                        Some(value) => *value,
                        None => {
                            let value = scorer.score(person, group, others);
                            cache.0.insert(key, value);
                            value
                        }
                    }
                } else {
                    scorer.score(person, group, others)
                }
            })
            .sum()
    }
}

// ── Built-in scorers ───────────────────────────────────────────────

/// Same-country affinity with an optional saturating cap on how many
/// matches count. Positive weight pulls compatriots together.
pub struct SameCountryScorer {
    pub weight: f64,
    pub cap: Option<usize>,
}

impl Scorer for SameCountryScorer {
    fn score(&self, person: &Person, _group: &Activity, others: &[&Person]) -> f64 {
        let matches = others
            .iter()
            .filter(|other| other.country == person.country)
            .count();
        let counted = self.cap.map_or(matches, |cap| matches.min(cap));
        self.weight * counted as f64
    }
}

/// First-name collision penalty; `penalty` is typically negative.
/// Two people called Felix in one group confuse the announcer.
pub struct FirstNameScorer {
    pub penalty: f64,
}

impl Scorer for FirstNameScorer {
    fn score(&self, person: &Person, _group: &Activity, others: &[&Person]) -> f64 {
        let collisions = others
            .iter()
            .filter(|other| other.first_name() == person.first_name())
            .count();
        self.penalty * collisions as f64
    }
}

/// Rewards a long gap between a person's latest earlier assignment and
/// the candidate group's start, normalized against `window` seconds.
/// Someone who just finished an activity scores low; someone rested
/// scores the full weight.
pub struct RecencyScorer {
    weight: f64,
    window: i64,
    ends: HashMap<ActivityId, i64>,
}

impl RecencyScorer {
    pub fn new(schedule: &Schedule, weight: f64, window: i64) -> Self {
        let ends = schedule
            .all_activities()
            .iter()
            .map(|a| (a.id, a.end))
            .collect();
        Self {
            weight,
            window: window.max(1),
            ends,
        }
    }
}

impl Scorer for RecencyScorer {
    fn score(&self, person: &Person, group: &Activity, _others: &[&Person]) -> f64 {
        let gap = person
            .assignments
            .iter()
            .filter_map(|a| self.ends.get(&a.activity))
            .filter(|end| **end <= group.start)
            .map(|end| group.start - *end)
            .min();
        match gap {
            Some(gap) => self.weight * (gap.min(self.window) as f64 / self.window as f64),
            None => self.weight,
        }
    }

    fn cacheable(&self) -> bool {
        true
    }
}

/// Spreads holders of a role across groups: a delegate joining a group
/// that already has one is penalized. `penalty` is typically negative.
pub struct RoleDispersalScorer {
    pub role: StaffRole,
    pub penalty: f64,
}

impl Scorer for RoleDispersalScorer {
    fn score(&self, person: &Person, _group: &Activity, others: &[&Person]) -> f64 {
        if !person.has_role(self.role) {
            return 0.0;
        }
        let already = others
            .iter()
            .filter(|other| other.has_role(self.role))
            .count();
        self.penalty * already as f64
    }
}
