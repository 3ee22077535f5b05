//! Solver boundary error types.

use std::time::Duration;

use thiserror::Error;

/// Errors crossing the solver boundary. An infeasible model is NOT an
/// error — backends report it through `Solution::feasible` so callers
/// can relax and retry.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("failed to launch solver process `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver process i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request serialization failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("solver process timed out after {0:?}")]
    Timeout(Duration),

    #[error("solver process exited with status {code}: {detail}")]
    ProcessFailed { code: i32, detail: String },

    #[error("malformed solver response: {0}")]
    Malformed(String),

    #[error("solver reported error: {0}")]
    Solver(String),

    #[error("lp backend error: {0}")]
    Backend(String),
}

pub type SolveResult<T> = Result<T, SolveError>;
