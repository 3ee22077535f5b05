//! Domain types for people and their assignments.
//!
//! A `Person` is identified by a stable integer registrant id. The
//! allocators mutate each person's assignment list in place while they
//! hold the registry; everything else on a person is read-only input.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schedule::ActivityId;

/// Stable registrant identifier, unique within one competition record.
pub type RegistrantId = u32;

/// Event identifier, e.g. `"333"` or `"555bf"`.
pub type EventId = String;

// ── People ─────────────────────────────────────────────────────────

/// A registered participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub registrant_id: RegistrantId,
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// Epoch days; `None` when withheld.
    pub birth_date: Option<i64>,
    /// Events this person is registered to compete in.
    pub events: BTreeSet<EventId>,
    /// Organizational roles (delegate, organizer).
    pub roles: BTreeSet<StaffRole>,
    /// Personal-best records.
    pub bests: Vec<PersonalBest>,
    /// Extension properties attached by the external record.
    pub props: PropBag,
    /// Mutated in place by allocator passes.
    pub assignments: Vec<Assignment>,
}

impl Person {
    /// Look up a personal best for (event, kind).
    pub fn best(&self, event: &str, kind: RecordKind) -> Option<i64> {
        self.bests
            .iter()
            .find(|b| b.event == event && b.kind == kind)
            .map(|b| b.value)
    }

    /// First whitespace-separated token of the name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    pub fn has_role(&self, role: StaffRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the person holds a competitor assignment on the activity.
    pub fn competes_in(&self, activity: ActivityId) -> bool {
        self.assignments
            .iter()
            .any(|a| a.activity == activity && a.role.is_competitor())
    }

    /// Whether the person holds any assignment on the activity.
    pub fn assigned_to(&self, activity: ActivityId) -> bool {
        self.assignments.iter().any(|a| a.activity == activity)
    }

    /// Number of staff (non-competitor) assignments currently held.
    pub fn staff_assignment_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|a| !a.role.is_competitor())
            .count()
    }
}

/// Organizational role held independently of any one activity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Delegate,
    Organizer,
}

/// Metric kind for a personal-best record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Single,
    Average,
}

/// A personal-best result in centiseconds (or move count for fewest-moves).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonalBest {
    pub event: EventId,
    pub kind: RecordKind,
    pub value: i64,
}

// ── Assignments ────────────────────────────────────────────────────

/// What a person does at one activity.
///
/// `Competitor` is reserved and mutually exclusive with staff jobs on
/// the same activity for the same person within one allocation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentRole {
    Competitor,
    Staff { job: String },
}

impl AssignmentRole {
    pub fn staff(job: impl Into<String>) -> Self {
        Self::Staff { job: job.into() }
    }

    pub fn is_competitor(&self) -> bool {
        matches!(self, Self::Competitor)
    }

    /// Job name for staff roles, `None` for competitor.
    pub fn job(&self) -> Option<&str> {
        match self {
            Self::Competitor => None,
            Self::Staff { job } => Some(job),
        }
    }
}

/// A committed (activity, role, station) tuple on a person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub activity: ActivityId,
    pub role: AssignmentRole,
    /// 1-based, present only when a station rule assigned one.
    pub station: Option<u32>,
}

impl Assignment {
    pub fn competitor(activity: ActivityId) -> Self {
        Self {
            activity,
            role: AssignmentRole::Competitor,
            station: None,
        }
    }

    pub fn staff(activity: ActivityId, job: impl Into<String>, station: Option<u32>) -> Self {
        Self {
            activity,
            role: AssignmentRole::staff(job),
            station,
        }
    }
}

// ── Extension properties ───────────────────────────────────────────

/// A single extension-property value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Read-only bag of named preferences attached to a person by the
/// external record (job preference ratios, custom eligibility flags).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PropBag(BTreeMap<String, PropValue>);

impl PropBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(PropValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(PropValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(PropValue::Text(t)) => Some(t),
            _ => None,
        }
    }
}
