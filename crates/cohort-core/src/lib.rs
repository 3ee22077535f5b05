//! cohort-core — domain model for the assignment engine.
//!
//! Holds the types the allocators operate on:
//!
//! - **`types`** — people, assignments, roles, records, extension properties
//! - **`schedule`** — the venue → room → activity tree, with leaf groups
//! - **`conflicts`** — interval-overlap detection across the whole schedule
//! - **`registry`** — arena of people with registrant-id indirection
//!
//! This crate owns no I/O. The competition record, extension-property
//! store, and activity-code parsing live behind external collaborators;
//! the core only consumes their in-memory shapes.

pub mod conflicts;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod types;

pub use conflicts::{ConflictIndex, overlaps};
pub use error::{CoreError, CoreResult};
pub use registry::PersonRegistry;
pub use schedule::{Activity, ActivityCode, Room, Schedule, Venue};
pub use types::{
    Assignment, AssignmentRole, EventId, Person, PersonalBest, PropBag, PropValue, RecordKind,
    RegistrantId, StaffRole,
};
