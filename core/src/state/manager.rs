//! In-memory progress store with optional JSON snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use super::session::{validate_session_id, Session, WriteOutcome};
use super::snapshot::SnapshotStore;
use super::store::ProgressStore;
use super::types::ProgressEvent;
use crate::config::{ProgressBackend, ProgressConfig};
use crate::error::ProgressError;

const DEFAULT_EVENT_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct ProgressManager {
    inner: Arc<ProgressManagerInner>,
}

struct ProgressManagerInner {
    sessions: RwLock<HashMap<String, Session>>,
    event_tx: broadcast::Sender<ProgressEvent>,
    snapshots: Option<SnapshotStore>,
}

impl ProgressManager {
    /// Memory-only store.
    pub fn new() -> Self {
        Self::build(DEFAULT_EVENT_CAPACITY, None, HashMap::new())
    }

    /// Store backed by snapshots in `snapshots`; existing sessions are loaded.
    pub fn with_snapshots(snapshots: SnapshotStore) -> Result<Self, ProgressError> {
        Self::with_snapshots_and_capacity(snapshots, DEFAULT_EVENT_CAPACITY)
    }

    fn with_snapshots_and_capacity(
        snapshots: SnapshotStore,
        capacity: usize,
    ) -> Result<Self, ProgressError> {
        let sessions: HashMap<String, Session> = snapshots
            .load_all()?
            .into_iter()
            .map(|s| (s.session_id.clone(), s))
            .collect();
        tracing::info!(
            dir = %snapshots.dir().display(),
            sessions = sessions.len(),
            "loaded session snapshots"
        );
        Ok(Self::build(capacity, Some(snapshots), sessions))
    }

    pub fn from_config(cfg: &ProgressConfig) -> Result<Self, ProgressError> {
        let capacity = cfg.event_capacity.max(1);
        match (cfg.backend, cfg.directory.as_deref()) {
            (ProgressBackend::File, Some(dir)) if !dir.trim().is_empty() => {
                Self::with_snapshots_and_capacity(SnapshotStore::open(dir)?, capacity)
            }
            (ProgressBackend::File, _) => Err(ProgressError::Storage(
                "file progress backend requires progress.directory".to_string(),
            )),
            (ProgressBackend::Memory, _) => Ok(Self::build(capacity, None, HashMap::new())),
        }
    }

    fn build(
        capacity: usize,
        snapshots: Option<SnapshotStore>,
        sessions: HashMap<String, Session>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(ProgressManagerInner {
                sessions: RwLock::new(sessions),
                event_tx,
                snapshots,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit(&self, event: ProgressEvent) {
        // no subscribers is fine
        let _ = self.inner.event_tx.send(event);
    }

    fn persist(&self, session: &Session) -> Result<(), ProgressError> {
        match &self.inner.snapshots {
            Some(snapshots) => snapshots.save(session),
            None => Ok(()),
        }
    }

    /// Apply `f` to a copy under the write lock. The copy replaces the stored
    /// session only after it has been persisted, so a failed write leaves
    /// reads unchanged.
    async fn mutate<F>(&self, session_id: &str, f: F) -> Result<(Session, WriteOutcome), ProgressError>
    where
        F: FnOnce(&mut Session) -> Result<WriteOutcome, ProgressError> + Send,
    {
        let mut sessions = self.inner.sessions.write().await;
        let current = sessions
            .get(session_id)
            .ok_or_else(|| ProgressError::SessionNotFound(session_id.to_string()))?;

        let mut updated = current.clone();
        let outcome = f(&mut updated)?;
        if outcome.is_applied() {
            self.persist(&updated)?;
            sessions.insert(session_id.to_string(), updated.clone());
        }
        Ok((updated, outcome))
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for ProgressManager {
    async fn initialize(
        &self,
        session_id: &str,
        step_names: &[String],
        reset: bool,
    ) -> Result<Session, ProgressError> {
        validate_session_id(session_id)?;

        let session = {
            let mut sessions = self.inner.sessions.write().await;
            let session = match sessions.get(session_id) {
                Some(_) if !reset => {
                    return Err(ProgressError::AlreadyInitialized(session_id.to_string()))
                }
                Some(existing) => {
                    let mut fresh = existing.clone();
                    fresh.reset(step_names);
                    fresh
                }
                None => Session::new(session_id, step_names)?,
            };
            self.persist(&session)?;
            sessions.insert(session_id.to_string(), session.clone());
            session
        };

        tracing::info!(
            session_id,
            steps = session.total_steps(),
            attempt = session.attempt,
            "session initialized"
        );
        self.emit(ProgressEvent::SessionInitialized {
            session_id: session_id.to_string(),
            total_steps: session.total_steps(),
            attempt: session.attempt,
            timestamp: Utc::now(),
        });
        Ok(session)
    }

    async fn start_step(
        &self,
        session_id: &str,
        step: usize,
        message: Option<String>,
    ) -> Result<(), ProgressError> {
        let (session, outcome) = self
            .mutate(session_id, |s| s.start_step(step, message))
            .await?;
        if outcome.is_applied() {
            let name = session
                .step(step)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            self.emit(ProgressEvent::StepStarted {
                session_id: session_id.to_string(),
                step,
                name,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn complete_step(
        &self,
        session_id: &str,
        step: usize,
        result: Option<Value>,
    ) -> Result<(), ProgressError> {
        let (_, outcome) = self
            .mutate(session_id, |s| s.complete_step(step, result))
            .await?;
        if outcome.is_applied() {
            self.emit(ProgressEvent::StepCompleted {
                session_id: session_id.to_string(),
                step,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn add_step_warning(
        &self,
        session_id: &str,
        step: usize,
        warning: String,
    ) -> Result<(), ProgressError> {
        let event_warning = warning.clone();
        let (_, outcome) = self
            .mutate(session_id, |s| s.add_warning(step, warning))
            .await?;
        if outcome.is_applied() {
            self.emit(ProgressEvent::StepWarning {
                session_id: session_id.to_string(),
                step,
                warning: event_warning,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn fail_step(
        &self,
        session_id: &str,
        step: usize,
        error: String,
    ) -> Result<(), ProgressError> {
        let event_error = error.clone();
        let (_, outcome) = self
            .mutate(session_id, |s| s.fail_step(step, error))
            .await?;
        if outcome.is_applied() {
            self.emit(ProgressEvent::StepFailed {
                session_id: session_id.to_string(),
                step,
                error: event_error.clone(),
                timestamp: Utc::now(),
            });
            self.emit(ProgressEvent::SessionFailed {
                session_id: session_id.to_string(),
                error: event_error,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn fail_session(&self, session_id: &str, error: String) -> Result<(), ProgressError> {
        let event_error = error.clone();
        let (_, outcome) = self.mutate(session_id, |s| s.fail(error)).await?;
        if outcome.is_applied() {
            self.emit(ProgressEvent::SessionFailed {
                session_id: session_id.to_string(),
                error: event_error,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn complete(&self, session_id: &str) -> Result<(), ProgressError> {
        let (_, outcome) = self.mutate(session_id, |s| s.complete()).await?;
        if outcome.is_applied() {
            self.emit(ProgressEvent::SessionCompleted {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Session, ProgressError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProgressError::SessionNotFound(session_id.to_string()))
    }

    async fn current_in_progress_step(
        &self,
        session_id: &str,
    ) -> Result<Option<usize>, ProgressError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .map(Session::current_in_progress_step)
            .ok_or_else(|| ProgressError::SessionNotFound(session_id.to_string()))
    }

    async fn list(&self) -> Vec<String> {
        let sessions = self.inner.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}
