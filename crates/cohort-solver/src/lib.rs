//! cohort-solver — the solver boundary of the assignment engine.
//!
//! The model builders upstream speak one universal format: a sparse
//! mapping of boolean decision variables to constraint coefficients
//! plus named constraint bounds (`model`). Two backends consume it:
//!
//! - **`lp`** — the in-process linear-programming backend behind the
//!   `LpBackend` trait, used by the competitor and staff allocators
//! - **`subprocess`** — the external constraint-programming process
//!   port used by the wave balancer, exchanging JSON over stdio
//!
//! Models are constructed through `ModelBuilder`, never hand-assembled
//! inline, so the solver boundary stays stable across backends.

pub mod error;
pub mod lp;
pub mod model;
pub mod subprocess;

pub use error::{SolveError, SolveResult};
pub use lp::{LpBackend, MicroLp};
pub use model::{Bounds, Model, ModelBuilder, Sense, Solution};
pub use subprocess::CpProcess;
