//! In-process linear-programming backend.
//!
//! `LpBackend` is the pluggable trait the allocators depend on;
//! `MicroLp` implements it on `good_lp`'s pure-Rust `microlp` solver.
//! The assignment sub-models are transportation-shaped (per-person,
//! per-slot, and total rows form a totally unimodular matrix), so the
//! simplex optimum lands on integral vertices and the LP relaxation is
//! exact for them; `integers` flags are only meaningful to the CP side.

use std::collections::BTreeMap;

use good_lp::{
    Expression, ResolutionError, Solution as _, SolverModel, Variable, constraint,
    default_solver, variable, variables,
};
use tracing::debug;

use crate::error::{SolveError, SolveResult};
use crate::model::{Model, Sense, Solution};

/// The universal in-process solve contract.
pub trait LpBackend {
    fn solve(&self, model: &Model) -> SolveResult<Solution>;
}

/// `good_lp` + `microlp` backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLp;

impl LpBackend for MicroLp {
    fn solve(&self, model: &Model) -> SolveResult<Solution> {
        let mut vars = variables!();
        let mut handles: BTreeMap<&str, Variable> = BTreeMap::new();
        for name in model.variables.keys() {
            handles.insert(name.as_str(), vars.add(variable().min(0.0).max(1.0)));
        }

        let objective = model
            .variables
            .iter()
            .fold(Expression::from(0.0), |acc, (name, rows)| {
                match rows.get(&model.objective) {
                    Some(coeff) => acc + *coeff * handles[name.as_str()],
                    None => acc,
                }
            });

        let mut problem = match model.sense {
            Sense::Maximize => vars.maximise(objective.clone()).using(default_solver),
            Sense::Minimize => vars.minimise(objective.clone()).using(default_solver),
        };

        // Accumulate each constraint row's linear expression.
        let mut row_exprs: BTreeMap<&str, Expression> = BTreeMap::new();
        for (name, rows) in &model.variables {
            let handle = handles[name.as_str()];
            for (row, coeff) in rows {
                if row == &model.objective {
                    continue;
                }
                let entry = row_exprs
                    .entry(row.as_str())
                    .or_insert_with(|| Expression::from(0.0));
                *entry += *coeff * handle;
            }
        }

        for (row, bounds) in &model.constraints {
            let expr = row_exprs
                .remove(row.as_str())
                .unwrap_or_else(|| Expression::from(0.0));
            if let Some(equal) = bounds.equal {
                problem = problem.with(constraint::eq(expr, equal));
            } else {
                if let Some(max) = bounds.max {
                    problem = problem.with(constraint::leq(expr.clone(), max));
                }
                if let Some(min) = bounds.min {
                    problem = problem.with(constraint::geq(expr, min));
                }
            }
        }

        match problem.solve() {
            Ok(solved) => {
                let values = model
                    .variables
                    .keys()
                    .map(|name| (name.clone(), solved.value(handles[name.as_str()])))
                    .collect();
                let objective_value = solved.eval(objective);
                debug!(
                    variables = model.variable_count(),
                    objective = objective_value,
                    "lp solve complete"
                );
                Ok(Solution {
                    feasible: true,
                    status: "optimal".to_string(),
                    objective: objective_value,
                    values,
                })
            }
            Err(ResolutionError::Infeasible) => Ok(Solution::infeasible("infeasible")),
            Err(other) => Err(SolveError::Backend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bounds, ModelBuilder};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn maximize_picks_higher_coefficient() {
        let mut builder = ModelBuilder::new(Sense::Maximize, "score");
        builder
            .bound("seats", Bounds::at_most(1.0))
            .coefficient("x", "seats", 1.0)
            .coefficient("y", "seats", 1.0)
            .objective_coefficient("x", 2.0)
            .objective_coefficient("y", 1.0);

        let solution = MicroLp.solve(&builder.build()).unwrap();
        assert!(solution.feasible);
        assert!(close(solution.value("x"), 1.0));
        assert!(close(solution.value("y"), 0.0));
        assert!(close(solution.objective, 2.0));
    }

    #[test]
    fn equality_row_forces_total() {
        let mut builder = ModelBuilder::new(Sense::Minimize, "cost");
        builder
            .bound("total", Bounds::exactly(1.0))
            .coefficient("x", "total", 1.0)
            .coefficient("y", "total", 1.0)
            .objective_coefficient("x", 1.0);

        let solution = MicroLp.solve(&builder.build()).unwrap();
        assert!(solution.feasible);
        assert!(close(solution.value("x"), 0.0));
        assert!(close(solution.value("y"), 1.0));
    }

    #[test]
    fn contradictory_rows_report_infeasible() {
        let mut builder = ModelBuilder::new(Sense::Maximize, "score");
        builder
            .bound("must", Bounds::exactly(1.0))
            .bound("cant", Bounds::at_most(0.0))
            .coefficient("x", "must", 1.0)
            .coefficient("x", "cant", 1.0);

        let solution = MicroLp.solve(&builder.build()).unwrap();
        assert!(!solution.feasible);
        assert_eq!(solution.status, "infeasible");
        assert!(solution.values.is_empty());
    }

    #[test]
    fn assignment_shaped_model_solves_integrally() {
        // 4 people, 2 slots of capacity 2, all 4 must be placed.
        let mut builder = ModelBuilder::new(Sense::Maximize, "score");
        builder.bound("totalAssigned", Bounds::exactly(4.0));
        for slot in ["a", "b"] {
            builder.bound(format!("slot:{slot}"), Bounds::at_most(2.0));
        }
        for person in 1..=4u32 {
            builder.bound(format!("person:{person}"), Bounds::at_most(1.0));
            for slot in ["a", "b"] {
                let var = format!("p{person}:{slot}");
                builder
                    .coefficient(&var, format!("person:{person}"), 1.0)
                    .coefficient(&var, format!("slot:{slot}"), 1.0)
                    .coefficient(&var, "totalAssigned", 1.0)
                    .objective_coefficient(&var, f64::from(person));
            }
        }

        let solution = MicroLp.solve(&builder.build()).unwrap();
        assert!(solution.feasible);
        for value in solution.values.values() {
            assert!(
                close(*value, 0.0) || close(*value, 1.0),
                "expected integral vertex, got {value}"
            );
        }
        assert_eq!(solution.chosen().count(), 4);
    }
}
