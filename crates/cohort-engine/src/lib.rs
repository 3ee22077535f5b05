//! cohort-engine — the assignment/scheduling engine.
//!
//! Distributes a population across capacity-bounded groups, fills
//! labeled staff jobs per activity, and partitions multi-event pools
//! into balanced waves. The engine is single-threaded and synchronous
//! except for the external constraint-programming call the wave
//! balancer makes.
//!
//! # Components
//!
//! - **`scorer`** / **`staff_scorer`** — composable desirability
//!   functions; combined by summation
//! - **`builder`** — the shared (person × slot) model-build primitive
//! - **`competitor`** — iterative group allocation with soft-capacity
//!   relaxation and assignment sets
//! - **`staff`** — per-activity job filling with running conflict state
//! - **`waves`** — integer wave partitioning via the external CP port
//!
//! Allocation never throws for soft shortfalls: results carry a
//! warnings list and callers decide whether to proceed. Programmer
//! errors and external-process failures are `Err`.

pub mod builder;
pub mod competitor;
pub mod error;
pub mod outcome;
pub mod scorer;
pub mod staff;
pub mod staff_scorer;
pub mod waves;

pub use builder::{ModelSlot, QUEUE_CAP, build_assignment_model};
pub use competitor::{AssignmentSet, CompetitorAllocator, CompetitorConfig, StationRule};
pub use error::{EngineError, EngineResult};
pub use outcome::AllocationOutcome;
pub use scorer::{
    FirstNameScorer, RecencyScorer, RoleDispersalScorer, SameCountryScorer, ScoreCache, Scorer,
    ScorerSet,
};
pub use staff::{JobSpec, StaffAllocator, StaffConfig};
pub use staff_scorer::{
    AssignmentLoadScorer, ContinuityScorer, JobPreferenceScorer, StaffScorer, StaffScorerSet,
};
pub use waves::{WaveBalancer, WaveConfig, WaveOutcome, build_wave_model};
