//! Core error types.

use thiserror::Error;

use crate::schedule::ActivityId;
use crate::types::RegistrantId;

/// Errors raised by the domain model. These are programmer errors —
/// soft allocation shortfalls are reported as warnings, not here.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("activity not found: {0}")]
    ActivityNotFound(ActivityId),

    #[error("round not found: {event} round {round}")]
    RoundNotFound { event: String, round: u32 },

    #[error("duplicate registrant id: {0}")]
    DuplicateRegistrant(RegistrantId),

    #[error("person not found: {0}")]
    PersonNotFound(RegistrantId),
}

pub type CoreResult<T> = Result<T, CoreError>;
