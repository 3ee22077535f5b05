//! Engine error types.

use thiserror::Error;

use cohort_core::{CoreError, RegistrantId};
use cohort_solver::SolveError;

/// Hard failures of the engine. Soft shortfalls (infeasible subset,
/// insufficient staff) are warnings on `AllocationOutcome`, never here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error("no one is registered for any of the wave events")]
    EmptyWavePool,

    #[error("wave capacity {available} is below the population {needed}")]
    WaveCapacity { needed: u32, available: u32 },

    #[error("registrant {0} is excluded from every wave")]
    FullyExcluded(RegistrantId),

    #[error("wave balancing found no feasible assignment: {status}")]
    WaveInfeasible { status: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
