//! Allocation pass results.

use tracing::warn;

/// What one allocation pass accomplished. Soft shortfalls land in
/// `warnings` so callers can decide whether to proceed.
#[derive(Debug, Default)]
pub struct AllocationOutcome {
    /// Number of assignments committed by the pass.
    pub placed: usize,
    pub warnings: Vec<String>,
}

impl AllocationOutcome {
    /// Record (and log) a soft-shortfall warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
