//! Progress store: per-session, per-step status that external clients poll.
//!
//! The orchestrator is the only writer of a session; pollers read copies.
//! `ProgressManager` keeps sessions in memory behind a `RwLock`, broadcasts a
//! `ProgressEvent` for each committed write and, when configured, mirrors
//! every session to a JSON snapshot so progress survives a restart.

pub mod manager;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod transitions;
pub mod types;
pub mod view;

pub use manager::ProgressManager;
pub use session::{validate_session_id, Session, Step, WriteOutcome};
pub use snapshot::SnapshotStore;
pub use store::ProgressStore;
pub use transitions::StepTransition;
pub use types::{ProgressEvent, SessionStatus, StepStatus};
pub use view::{ProgressView, StepView};
