//! The activity schedule tree.
//!
//! Venues contain rooms, rooms contain activities, activities contain
//! child activities (a round's groups). A **group** is a leaf activity
//! and is the unit of capacity-bounded assignment; rounds and other
//! interior nodes never receive assignments directly.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::EventId;

/// Identifier of one activity inside the schedule tree.
pub type ActivityId = u32;

/// Hierarchical event/round/group coordinates of an activity.
///
/// String parsing of activity codes belongs to the external record
/// layer; inside the engine codes are always structured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActivityCode {
    pub event: EventId,
    pub round: u32,
    /// `None` for the round activity itself, `Some` for its groups.
    pub group: Option<u32>,
}

impl ActivityCode {
    pub fn round(event: impl Into<EventId>, round: u32) -> Self {
        Self {
            event: event.into(),
            round,
            group: None,
        }
    }

    pub fn group(event: impl Into<EventId>, round: u32, group: u32) -> Self {
        Self {
            event: event.into(),
            round,
            group: Some(group),
        }
    }
}

impl std::fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group {
            Some(g) => write!(f, "{}-r{}-g{}", self.event, self.round, g),
            None => write!(f, "{}-r{}", self.event, self.round),
        }
    }
}

/// A time-boxed activity. `start`/`end` are epoch seconds and the
/// interval is half-open: `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: ActivityId,
    pub code: ActivityCode,
    pub name: String,
    pub start: i64,
    pub end: i64,
    pub children: Vec<Activity>,
}

impl Activity {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first walk over this activity and all its descendants.
    pub fn walk(&self) -> Vec<&Activity> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Activity>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// A physical room with its top-level activities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: u32,
    pub name: String,
    pub activities: Vec<Activity>,
}

/// A competition venue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    pub id: u32,
    pub name: String,
    pub rooms: Vec<Room>,
}

/// The full schedule tree for one competition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub venues: Vec<Venue>,
}

impl Schedule {
    /// Every activity in the tree, including nested children.
    pub fn all_activities(&self) -> Vec<&Activity> {
        let mut out = Vec::new();
        for venue in &self.venues {
            for room in &venue.rooms {
                for activity in &room.activities {
                    activity.collect(&mut out);
                }
            }
        }
        out
    }

    /// Look up one activity by id anywhere in the tree.
    pub fn activity(&self, id: ActivityId) -> CoreResult<&Activity> {
        self.all_activities()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(CoreError::ActivityNotFound(id))
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.all_activities().iter().any(|a| a.id == id)
    }

    /// The leaf groups of one round, across all rooms, in group order.
    ///
    /// A round activity with no children is itself the single group.
    pub fn groups_for_round(&self, event: &str, round: u32) -> CoreResult<Vec<&Activity>> {
        let mut rounds = Vec::new();
        for activity in self.all_activities() {
            if activity.code.event == event
                && activity.code.round == round
                && activity.code.group.is_none()
            {
                rounds.push(activity);
            }
        }
        if rounds.is_empty() {
            return Err(CoreError::RoundNotFound {
                event: event.to_string(),
                round,
            });
        }

        let mut groups: Vec<&Activity> = Vec::new();
        for round_activity in rounds {
            if round_activity.is_leaf() {
                groups.push(round_activity);
            } else {
                groups.extend(round_activity.children.iter().filter(|c| c.is_leaf()));
            }
        }
        groups.sort_by_key(|g| (g.code.group, g.id));
        Ok(groups)
    }

    /// Every leaf activity in the tree, sorted by (start, id).
    pub fn leaves(&self) -> Vec<&Activity> {
        let mut leaves: Vec<&Activity> = self
            .all_activities()
            .into_iter()
            .filter(|a| a.is_leaf())
            .collect();
        leaves.sort_by_key(|a| (a.start, a.id));
        leaves
    }
}
