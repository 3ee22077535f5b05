//! The typed sparse model and its builder.
//!
//! Serialization matches the wire contract of the external
//! constraint-programming process: `optimize` names the objective row,
//! `constraints` maps row name → bounds, `variables` maps variable
//! name → row → coefficient, `integers` lists the boolean variables.
//! `BTreeMap` keys keep the serialized form deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

/// Optimization direction. Not part of the wire format — the external
/// CP process always minimizes, the LP backend honors either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sense {
    #[default]
    Maximize,
    Minimize,
}

/// Bounds on one constraint row.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Bounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equal: Option<f64>,
}

impl Bounds {
    pub fn at_most(value: f64) -> Self {
        Self {
            max: Some(value),
            ..Self::default()
        }
    }

    pub fn at_least(value: f64) -> Self {
        Self {
            min: Some(value),
            ..Self::default()
        }
    }

    pub fn exactly(value: f64) -> Self {
        Self {
            equal: Some(value),
            ..Self::default()
        }
    }
}

/// A sparse linear/integer program over boolean decision variables.
#[derive(Debug, Clone, Serialize)]
pub struct Model {
    #[serde(rename = "optimize")]
    pub objective: String,
    #[serde(skip)]
    pub sense: Sense,
    pub constraints: BTreeMap<String, Bounds>,
    pub variables: BTreeMap<String, BTreeMap<String, f64>>,
    pub integers: BTreeSet<String>,
}

impl Model {
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Objective-row coefficient of one variable (0 when absent).
    pub fn objective_coefficient(&self, variable: &str) -> f64 {
        self.variables
            .get(variable)
            .and_then(|rows| rows.get(&self.objective))
            .copied()
            .unwrap_or(0.0)
    }
}

/// The only way models are built. Keeps variable/constraint wiring in
/// one place so the two allocators and the wave balancer produce
/// structurally identical output.
#[derive(Debug)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    pub fn new(sense: Sense, objective: impl Into<String>) -> Self {
        Self {
            model: Model {
                objective: objective.into(),
                sense,
                constraints: BTreeMap::new(),
                variables: BTreeMap::new(),
                integers: BTreeSet::new(),
            },
        }
    }

    /// Declare (or replace) a constraint row's bounds.
    pub fn bound(&mut self, row: impl Into<String>, bounds: Bounds) -> &mut Self {
        self.model.constraints.insert(row.into(), bounds);
        self
    }

    /// Set a variable's coefficient on a constraint row. Declares the
    /// variable on first use.
    pub fn coefficient(
        &mut self,
        variable: impl Into<String>,
        row: impl Into<String>,
        value: f64,
    ) -> &mut Self {
        self.model
            .variables
            .entry(variable.into())
            .or_default()
            .insert(row.into(), value);
        self
    }

    /// Set a variable's objective-row coefficient.
    pub fn objective_coefficient(
        &mut self,
        variable: impl Into<String>,
        value: f64,
    ) -> &mut Self {
        let row = self.model.objective.clone();
        self.coefficient(variable, row, value)
    }

    /// Mark a variable as integer (boolean on the CP side).
    pub fn integer(&mut self, variable: impl Into<String>) -> &mut Self {
        self.model.integers.insert(variable.into());
        self
    }

    pub fn build(self) -> Model {
        self.model
    }
}

/// A solve result in the universal contract shape.
#[derive(Debug, Clone)]
pub struct Solution {
    pub feasible: bool,
    /// Backend status, e.g. `optimal`, `feasible`, `infeasible`.
    pub status: String,
    /// Objective value; 0 when infeasible.
    pub objective: f64,
    pub values: HashMap<String, f64>,
}

impl Solution {
    pub fn infeasible(status: impl Into<String>) -> Self {
        Self {
            feasible: false,
            status: status.into(),
            objective: 0.0,
            values: HashMap::new(),
        }
    }

    pub fn value(&self, variable: &str) -> f64 {
        self.values.get(variable).copied().unwrap_or(0.0)
    }

    /// Variables the solver switched on. Boolean decision variables
    /// are read with a `> 0.5` threshold.
    pub fn chosen(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, v)| **v > 0.5)
            .map(|(name, _)| name.as_str())
    }
}
