//! The shared (person × slot) model-build primitive.
//!
//! Both allocators produce their sub-models through this builder: one
//! boolean decision variable per feasible (person, slot) pair, a
//! per-person at-most-one row, a per-slot capacity (or exact-count)
//! row, and optionally a global `totalAssigned` row pinning the number
//! of placements so the solver cannot leave people unplaced while
//! slack remains elsewhere.
//!
//! Objective coefficients are de-biased: from every variable of a
//! person we subtract `total_score_for_person / slot_count` (so people
//! are not all pulled toward the single highest-magnitude slot) and
//! the person's queue index (a strict tie-break that makes convergence
//! deterministic under equal scores). The subtraction is a documented
//! heuristic, preserved in this exact form.

use std::collections::HashMap;

use cohort_solver::{Bounds, Model, ModelBuilder, Sense};

use cohort_core::RegistrantId;

/// Queue cap per model build. Bounding the sub-model keeps the solve
/// tractable at the cost of optimizing over a window of the queue.
pub const QUEUE_CAP: usize = 100;

/// One target slot in an assignment model.
#[derive(Debug, Clone)]
pub struct ModelSlot {
    /// Naming segment for variables and the slot's constraint row.
    pub key: String,
    /// Remaining seats (capacity row bound).
    pub capacity: f64,
    /// Equality row (staff headcounts) instead of at-most.
    pub exact: bool,
}

/// A built model plus the decode table from variable name back to
/// (person, slot index).
#[derive(Debug)]
pub struct AssignmentModel {
    pub model: Model,
    pub vars: HashMap<String, (RegistrantId, usize)>,
}

/// Build an assignment sub-model.
///
/// `score` returns `None` for pairs excluded by a hard conflict; such
/// pairs get no variable at all. `pinned` names the one slot a sticky
/// pre-assignment holds a person to — the person gets only that
/// variable and an equality row, so the solver cannot move them.
pub fn build_assignment_model<S, P>(
    queue: &[RegistrantId],
    slots: &[ModelSlot],
    mut score: S,
    mut pinned: P,
    with_total: bool,
) -> AssignmentModel
where
    S: FnMut(RegistrantId, usize) -> Option<f64>,
    P: FnMut(RegistrantId) -> Option<usize>,
{
    let mut builder = ModelBuilder::new(Sense::Maximize, "score");
    let slot_count = slots.len() as f64;

    for slot in slots {
        let bounds = if slot.exact {
            Bounds::exactly(slot.capacity)
        } else {
            Bounds::at_most(slot.capacity)
        };
        builder.bound(format!("slot:{}", slot.key), bounds);
    }

    // First pass: feasible (slot, raw score) lists per person.
    let mut feasible: Vec<(RegistrantId, usize, Vec<(usize, f64)>)> = Vec::new();
    for (queue_index, &person) in queue.iter().enumerate() {
        let pin = pinned(person);
        let mut options: Vec<(usize, f64)> = Vec::new();
        for slot_index in 0..slots.len() {
            if let Some(pinned_slot) = pin {
                if pinned_slot != slot_index {
                    continue;
                }
            }
            if let Some(value) = score(person, slot_index) {
                options.push((slot_index, value));
            }
        }
        if !options.is_empty() {
            feasible.push((person, queue_index, options));
        }
    }

    if with_total {
        let seats: f64 = slots.iter().map(|s| s.capacity).sum();
        let total = (feasible.len() as f64).min(seats);
        builder.bound("totalAssigned", Bounds::exactly(total));
    }

    let mut vars = HashMap::new();
    for (person, queue_index, options) in feasible {
        let total_score: f64 = options.iter().map(|(_, s)| s).sum();
        let debias = total_score / slot_count + queue_index as f64;

        let person_row = format!("person:{person}");
        let pin = pinned(person);
        let person_bounds = if pin.is_some() {
            Bounds::exactly(1.0)
        } else {
            Bounds::at_most(1.0)
        };
        builder.bound(&person_row, person_bounds);

        for (slot_index, raw) in options {
            let name = format!("p{person}:{}", slots[slot_index].key);
            builder
                .coefficient(&name, &person_row, 1.0)
                .coefficient(&name, format!("slot:{}", slots[slot_index].key), 1.0)
                .objective_coefficient(&name, raw - debias)
                .integer(&name);
            if with_total {
                builder.coefficient(&name, "totalAssigned", 1.0);
            }
            vars.insert(name, (person, slot_index));
        }
    }

    AssignmentModel {
        model: builder.build(),
        vars,
    }
}
