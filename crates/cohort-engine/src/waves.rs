//! Multi-event wave balancing.
//!
//! When several events run simultaneously and share a bounded pool of
//! stations and staff, each person registered for any of them is
//! assigned to exactly one of N parallel waves. Wave sizes match
//! precomputed targets, hard per-person exclusions are honored by
//! never creating the excluded variables, and two auxiliary mechanisms
//! shape the objective:
//!
//! - a 0/1 **touch** variable per (wave, event), linked to the real
//!   assignment variables by a big-M row, tracks whether a wave needs
//!   that event's setup at all;
//! - a **penalty** variable per (delegate pair, wave) discourages two
//!   delegates from landing in the same wave when avoidable.
//!
//! The model requires true integer semantics at a scale the LP
//! relaxation path is not built for, so it is solved by the external
//! constraint-programming process. Launch failure, timeout, non-zero
//! exit, malformed output, and infeasibility are all hard failures.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use cohort_core::{EventId, PersonRegistry, RegistrantId, StaffRole};
use cohort_solver::{Bounds, CpProcess, Model, ModelBuilder, Sense};

use crate::error::{EngineError, EngineResult};

/// One wave-balancing request.
pub struct WaveConfig {
    /// The simultaneously-scheduled events sharing the waves.
    pub events: Vec<EventId>,
    pub wave_count: u32,
    /// Cap on any single wave's size.
    pub max_wave_size: u32,
    /// Hard per-person exclusions: wave numbers (1-based) the person
    /// must never be assigned to.
    pub exclusions: BTreeMap<RegistrantId, BTreeSet<u32>>,
}

/// A solved wave partition.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveOutcome {
    /// Wave number (1-based) per person.
    pub assignments: BTreeMap<RegistrantId, u32>,
    /// Which events each wave is touched by — which setups it needs.
    pub touched: BTreeMap<u32, BTreeSet<EventId>>,
    pub objective: f64,
}

/// Target sizes: the population divided as evenly as possible, with
/// the remainder going to earlier waves, each capped at the max size.
fn wave_targets(population: u32, wave_count: u32, max_wave_size: u32) -> Vec<u32> {
    let base = population / wave_count;
    let remainder = population % wave_count;
    (0..wave_count)
        .map(|i| {
            let target = base + u32::from(i < remainder);
            target.min(max_wave_size)
        })
        .collect()
}

/// Build the wave model. Pure; unit-tested directly.
pub fn build_wave_model(registry: &PersonRegistry, config: &WaveConfig) -> EngineResult<Model> {
    let population: Vec<_> = registry
        .iter()
        .filter(|p| p.events.iter().any(|e| config.events.contains(e)))
        .collect();
    if population.is_empty() {
        return Err(EngineError::EmptyWavePool);
    }

    let count = population.len() as u32;
    let targets = wave_targets(count, config.wave_count, config.max_wave_size);
    let available: u32 = targets.iter().sum();
    if available < count {
        return Err(EngineError::WaveCapacity {
            needed: count,
            available,
        });
    }

    let waves: Vec<u32> = (1..=config.wave_count).collect();
    let big_m = f64::from(count);
    let no_exclusions = BTreeSet::new();

    let mut builder = ModelBuilder::new(Sense::Minimize, "events");

    for (wave, target) in waves.iter().zip(&targets) {
        builder.bound(format!("wave:{wave}"), Bounds::exactly(f64::from(*target)));
    }

    for person in &population {
        let id = person.registrant_id;
        let excluded = config.exclusions.get(&id).unwrap_or(&no_exclusions);
        let allowed: Vec<u32> = waves
            .iter()
            .copied()
            .filter(|w| !excluded.contains(w))
            .collect();
        if allowed.is_empty() {
            return Err(EngineError::FullyExcluded(id));
        }

        builder.bound(format!("person:{id}"), Bounds::exactly(1.0));
        for wave in allowed {
            let name = format!("assign:p{id}:w{wave}");
            builder
                .coefficient(&name, format!("person:{id}"), 1.0)
                .coefficient(&name, format!("wave:{wave}"), 1.0)
                .integer(&name);
        }
    }

    // Touch linkage: sum(event registrants in wave) - M * touched <= 0,
    // so minimizing the objective drives touched to the indicator.
    for wave in &waves {
        for event in &config.events {
            let members: Vec<RegistrantId> = population
                .iter()
                .filter(|p| p.events.contains(event))
                .map(|p| p.registrant_id)
                .collect();
            if members.is_empty() {
                continue;
            }
            let row = format!("touch:w{wave}:{event}");
            builder.bound(&row, Bounds::at_most(0.0));
            for id in &members {
                let excluded = config.exclusions.get(id).unwrap_or(&no_exclusions);
                if excluded.contains(wave) {
                    continue;
                }
                builder.coefficient(format!("assign:p{id}:w{wave}"), &row, 1.0);
            }
            let touch = format!("touched:w{wave}:{event}");
            builder
                .coefficient(&touch, &row, -big_m)
                .objective_coefficient(&touch, 1.0)
                .integer(&touch);
        }
    }

    // Delegate pairing: assign(a) + assign(b) - pen <= 1 per wave, pen
    // entering the objective, so co-placing two delegates costs one.
    let delegates: Vec<RegistrantId> = population
        .iter()
        .filter(|p| p.has_role(StaffRole::Delegate))
        .map(|p| p.registrant_id)
        .collect();
    for (i, a) in delegates.iter().enumerate() {
        for b in delegates.iter().skip(i + 1) {
            for wave in &waves {
                let a_excluded = config
                    .exclusions
                    .get(a)
                    .is_some_and(|e| e.contains(wave));
                let b_excluded = config
                    .exclusions
                    .get(b)
                    .is_some_and(|e| e.contains(wave));
                if a_excluded || b_excluded {
                    continue;
                }
                let row = format!("pair:p{a}:p{b}:w{wave}");
                let pen = format!("pen:p{a}:p{b}:w{wave}");
                builder
                    .bound(&row, Bounds::at_most(1.0))
                    .coefficient(format!("assign:p{a}:w{wave}"), &row, 1.0)
                    .coefficient(format!("assign:p{b}:w{wave}"), &row, 1.0)
                    .coefficient(&pen, &row, -1.0)
                    .objective_coefficient(&pen, 1.0)
                    .integer(&pen);
            }
        }
    }

    let model = builder.build();
    debug!(
        people = population.len(),
        waves = config.wave_count,
        variables = model.variable_count(),
        "wave model built"
    );
    Ok(model)
}

/// Solves wave partitions through the external CP process.
pub struct WaveBalancer<'a> {
    registry: &'a PersonRegistry,
    process: &'a CpProcess,
}

impl<'a> WaveBalancer<'a> {
    pub fn new(registry: &'a PersonRegistry, process: &'a CpProcess) -> Self {
        Self { registry, process }
    }

    /// Build and solve one wave partition.
    pub async fn balance(&self, config: &WaveConfig) -> EngineResult<WaveOutcome> {
        let model = build_wave_model(self.registry, config)?;
        let solution = self.process.solve(&model).await?;
        if !solution.feasible {
            return Err(EngineError::WaveInfeasible {
                status: solution.status,
            });
        }

        let mut assignments = BTreeMap::new();
        let mut touched: BTreeMap<u32, BTreeSet<EventId>> = BTreeMap::new();
        for name in solution.chosen() {
            if let Some(rest) = name.strip_prefix("assign:p") {
                if let Some((person, wave)) = rest.split_once(":w") {
                    if let (Ok(person), Ok(wave)) = (person.parse(), wave.parse()) {
                        assignments.insert(person, wave);
                    }
                }
            } else if let Some(rest) = name.strip_prefix("touched:w") {
                if let Some((wave, event)) = rest.split_once(':') {
                    if let Ok(wave) = wave.parse::<u32>() {
                        touched.entry(wave).or_default().insert(event.to_string());
                    }
                }
            }
        }

        info!(
            people = assignments.len(),
            objective = solution.objective,
            "wave balancing complete"
        );
        Ok(WaveOutcome {
            assignments,
            touched,
            objective: solution.objective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::Person;
    use cohort_core::types::PropBag;
    use std::time::Duration;

    fn person(id: RegistrantId, events: &[&str]) -> Person {
        Person {
            registrant_id: id,
            name: format!("Person {id}"),
            country: "US".to_string(),
            birth_date: None,
            events: events.iter().map(|e| (*e).to_string()).collect(),
            roles: BTreeSet::new(),
            bests: Vec::new(),
            props: PropBag::new(),
            assignments: Vec::new(),
        }
    }

    fn registry_of(people: Vec<Person>) -> PersonRegistry {
        let mut registry = PersonRegistry::new();
        for p in people {
            registry.insert(p).unwrap();
        }
        registry
    }

    fn config(events: &[&str], waves: u32, max: u32) -> WaveConfig {
        WaveConfig {
            events: events.iter().map(|e| (*e).to_string()).collect(),
            wave_count: waves,
            max_wave_size: max,
            exclusions: BTreeMap::new(),
        }
    }

    #[test]
    fn targets_split_evenly_with_remainder_to_earlier_waves() {
        assert_eq!(wave_targets(10, 3, 25), vec![4, 3, 3]);
        assert_eq!(wave_targets(9, 3, 25), vec![3, 3, 3]);
        assert_eq!(wave_targets(10, 3, 3), vec![3, 3, 3]); // capped
    }

    #[test]
    fn model_pins_person_and_wave_rows() {
        let registry = registry_of(vec![
            person(1, &["clock"]),
            person(2, &["clock"]),
            person(3, &["mega"]),
        ]);
        let model = build_wave_model(&registry, &config(&["clock", "mega"], 2, 25)).unwrap();

        assert_eq!(model.constraints["person:1"].equal, Some(1.0));
        assert_eq!(model.constraints["wave:1"].equal, Some(2.0));
        assert_eq!(model.constraints["wave:2"].equal, Some(1.0));
        assert!(model.variables.contains_key("assign:p1:w1"));
        assert!(model.variables.contains_key("assign:p1:w2"));
        assert!(model.integers.contains("assign:p1:w1"));
    }

    #[test]
    fn excluded_pairs_get_no_variable_at_all() {
        let registry = registry_of(vec![
            person(1, &["clock"]),
            person(2, &["clock"]),
            person(3, &["clock"]),
            person(4, &["clock"]),
        ]);
        let mut cfg = config(&["clock"], 2, 25);
        cfg.exclusions
            .insert(1, BTreeSet::from([1]));

        let model = build_wave_model(&registry, &cfg).unwrap();

        // No route into wave 1 exists for person 1, so any feasible
        // solution keeps them out of it.
        assert!(!model.variables.contains_key("assign:p1:w1"));
        assert!(model.variables.contains_key("assign:p1:w2"));
        assert_eq!(model.constraints["person:1"].equal, Some(1.0));
    }

    #[test]
    fn person_excluded_everywhere_is_an_error() {
        let registry = registry_of(vec![person(1, &["clock"]), person(2, &["clock"])]);
        let mut cfg = config(&["clock"], 2, 25);
        cfg.exclusions.insert(1, BTreeSet::from([1, 2]));

        assert!(matches!(
            build_wave_model(&registry, &cfg),
            Err(EngineError::FullyExcluded(1))
        ));
    }

    #[test]
    fn capped_capacity_below_population_is_an_error() {
        let people: Vec<Person> = (1..=10).map(|id| person(id, &["clock"])).collect();
        let registry = registry_of(people);

        assert!(matches!(
            build_wave_model(&registry, &config(&["clock"], 2, 4)),
            Err(EngineError::WaveCapacity {
                needed: 10,
                available: 8
            })
        ));
    }

    #[test]
    fn no_registrants_is_an_error() {
        let registry = registry_of(vec![person(1, &["333"])]);
        assert!(matches!(
            build_wave_model(&registry, &config(&["clock"], 2, 25)),
            Err(EngineError::EmptyWavePool)
        ));
    }

    #[test]
    fn touch_rows_link_assignments_to_indicators() {
        let registry = registry_of(vec![person(1, &["clock"]), person(2, &["mega"])]);
        let model = build_wave_model(&registry, &config(&["clock", "mega"], 2, 25)).unwrap();

        // Person 1 contributes to the (wave 1, clock) touch row.
        assert_eq!(model.variables["assign:p1:w1"]["touch:w1:clock"], 1.0);
        // The indicator counters it with -M (population size).
        assert_eq!(model.variables["touched:w1:clock"]["touch:w1:clock"], -2.0);
        assert_eq!(model.objective_coefficient("touched:w1:clock"), 1.0);
        assert_eq!(model.constraints["touch:w1:clock"].max, Some(0.0));
    }

    #[test]
    fn delegate_pairs_get_penalty_variables() {
        let mut a = person(1, &["clock"]);
        a.roles.insert(StaffRole::Delegate);
        let mut b = person(2, &["clock"]);
        b.roles.insert(StaffRole::Delegate);
        let registry = registry_of(vec![a, b, person(3, &["clock"])]);

        let model = build_wave_model(&registry, &config(&["clock"], 2, 25)).unwrap();

        assert_eq!(model.constraints["pair:p1:p2:w1"].max, Some(1.0));
        assert_eq!(model.variables["pen:p1:p2:w1"]["pair:p1:p2:w1"], -1.0);
        assert_eq!(model.objective_coefficient("pen:p1:p2:w1"), 1.0);
        // No penalty machinery for non-delegate person 3.
        assert!(!model.constraints.contains_key("pair:p1:p3:w1"));
    }

    #[tokio::test]
    async fn balance_parses_assignments_and_touches() {
        let registry = registry_of(vec![
            person(1, &["clock"]),
            person(2, &["clock"]),
            person(3, &["mega"]),
            person(4, &["mega"]),
        ]);
        let mut cfg = config(&["clock", "mega"], 2, 25);
        cfg.exclusions.insert(1, BTreeSet::from([1]));

        // Stub solver returning a precomputed feasible partition that
        // honors the exclusion: person 1 goes to wave 2.
        let response = r#"{"feasible": true, "status": "optimal", "result": 2.0,
            "assign:p1:w2": 1, "assign:p2:w1": 1, "assign:p3:w1": 1, "assign:p4:w2": 1,
            "touched:w1:clock": 1, "touched:w1:mega": 1, "touched:w2:clock": 1, "touched:w2:mega": 1}"#;
        let script = format!("cat > /dev/null; printf '%s' '{}'", response.replace('\n', " "));
        let process = CpProcess::new("sh", vec!["-c".to_string(), script]);

        let balancer = WaveBalancer::new(&registry, &process);
        let outcome = balancer.balance(&cfg).await.unwrap();

        assert_eq!(outcome.assignments[&1], 2);
        assert_ne!(outcome.assignments[&1], 1);
        assert_eq!(outcome.assignments.len(), 4);
        assert_eq!(outcome.objective, 2.0);
        assert!(outcome.touched[&1].contains("clock"));
    }

    #[tokio::test]
    async fn infeasible_solve_is_a_hard_failure() {
        let registry = registry_of(vec![person(1, &["clock"]), person(2, &["clock"])]);
        let process = CpProcess::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; printf '{"feasible": false, "status": "infeasible", "result": null}'"#
                    .to_string(),
            ],
        )
        .with_timeout(Duration::from_secs(5));

        let balancer = WaveBalancer::new(&registry, &process);
        let err = balancer
            .balance(&config(&["clock"], 2, 25))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WaveInfeasible { .. }));
    }
}
