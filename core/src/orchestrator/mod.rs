//! Orchestrator: owns the ordered stage list and drives a session through it.
//!
//! `pending → in_progress → {completed, failed}`; terminal states are
//! absorbing. A retry re-initializes the session and replays every stage.

#[allow(clippy::module_inception)]
mod orchestrator;
mod pipeline;
mod registry;

pub use orchestrator::{FailureKind, Orchestrator, RunOutcome};
pub use pipeline::Pipeline;
pub use registry::{RunGuard, RunRegistry};
