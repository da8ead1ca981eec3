use async_trait::async_trait;
use serde_json::Value;

use super::session::Session;
use super::view::ProgressView;
use crate::error::ProgressError;

/// Persisted per-session, per-step progress.
///
/// Writes are monotonic and repeated identical calls are no-ops. Reads return
/// a copy of the latest committed state and never block on running tasks.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Create the session with every step pending. With `reset` an existing
    /// session is re-created in place and its `attempt` counter incremented;
    /// without it an existing session is `AlreadyInitialized`.
    async fn initialize(
        &self,
        session_id: &str,
        step_names: &[String],
        reset: bool,
    ) -> Result<Session, ProgressError>;

    async fn start_step(
        &self,
        session_id: &str,
        step: usize,
        message: Option<String>,
    ) -> Result<(), ProgressError>;

    async fn complete_step(
        &self,
        session_id: &str,
        step: usize,
        result: Option<Value>,
    ) -> Result<(), ProgressError>;

    async fn add_step_warning(
        &self,
        session_id: &str,
        step: usize,
        warning: String,
    ) -> Result<(), ProgressError>;

    /// Fails the step and the session immediately.
    async fn fail_step(&self, session_id: &str, step: usize, error: String)
        -> Result<(), ProgressError>;

    async fn fail_session(&self, session_id: &str, error: String) -> Result<(), ProgressError>;

    async fn complete(&self, session_id: &str) -> Result<(), ProgressError>;

    async fn read(&self, session_id: &str) -> Result<Session, ProgressError>;

    async fn current_in_progress_step(&self, session_id: &str)
        -> Result<Option<usize>, ProgressError>;

    async fn list(&self) -> Vec<String>;

    async fn view(&self, session_id: &str) -> Result<ProgressView, ProgressError> {
        let session = self.read(session_id).await?;
        Ok(ProgressView::from(&session))
    }
}
