//! Session and step records with their write rules.
//!
//! Every mutating method validates first and only then touches the record, so
//! a rejected write leaves the session exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transitions::StepTransition;
use super::types::{SessionStatus, StepStatus};
use crate::error::ProgressError;

/// Result of an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Repeated identical call; nothing changed.
    Unchanged,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position, fixed for the life of the run.
    pub step: usize,
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    fn new(step: usize, name: impl Into<String>) -> Self {
        Self {
            step,
            name: name.into(),
            status: StepStatus::Pending,
            message: None,
            error: None,
            warnings: Vec::new(),
            result: None,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub overall_status: SessionStatus,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times the session was (re)initialized.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new<S: AsRef<str>>(session_id: &str, step_names: &[S]) -> Result<Self, ProgressError> {
        validate_session_id(session_id)?;
        let now = Utc::now();
        Ok(Self {
            session_id: session_id.to_string(),
            overall_status: SessionStatus::Pending,
            steps: build_steps(step_names),
            error: None,
            attempt: 1,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    /// Re-create every step in place for a fresh attempt. `created_at` is kept.
    pub fn reset<S: AsRef<str>>(&mut self, step_names: &[S]) {
        self.overall_status = SessionStatus::Pending;
        self.steps = build_steps(step_names);
        self.error = None;
        self.attempt += 1;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, n: usize) -> Option<&Step> {
        n.checked_sub(1).and_then(|idx| self.steps.get(idx))
    }

    pub fn current_in_progress_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
            .map(|s| s.step)
    }

    /// The step a poller should display: the active one, otherwise the last
    /// step that left `pending`, otherwise 0.
    pub fn current_step(&self) -> usize {
        self.current_in_progress_step().unwrap_or_else(|| {
            self.steps
                .iter()
                .rev()
                .find(|s| s.status != StepStatus::Pending)
                .map(|s| s.step)
                .unwrap_or(0)
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    pub fn start_step(
        &mut self,
        n: usize,
        message: Option<String>,
    ) -> Result<WriteOutcome, ProgressError> {
        let idx = self.index_of(n)?;
        self.ensure_writable()?;

        if self.steps[idx].status == StepStatus::InProgress {
            if message.is_some() && self.steps[idx].message != message {
                self.steps[idx].message = message;
                self.touch();
                return Ok(WriteOutcome::Applied);
            }
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(active) = self.current_in_progress_step() {
            return Err(ProgressError::StepAlreadyActive {
                active,
                requested: n,
            });
        }
        StepTransition::validate(n, self.steps[idx].status, StepStatus::InProgress)?;

        let now = Utc::now();
        let step = &mut self.steps[idx];
        step.status = StepStatus::InProgress;
        step.message = message;
        step.started_at = Some(now);

        self.overall_status = SessionStatus::InProgress;
        self.started_at.get_or_insert(now);
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    pub fn complete_step(
        &mut self,
        n: usize,
        result: Option<Value>,
    ) -> Result<WriteOutcome, ProgressError> {
        let idx = self.index_of(n)?;
        if self.steps[idx].status == StepStatus::Completed {
            return Ok(WriteOutcome::Unchanged);
        }
        self.ensure_writable()?;

        let from = self.steps[idx].status;
        StepTransition::validate(n, from, StepStatus::Completed)?;
        if StepTransition::is_anomalous(from, StepStatus::Completed) {
            tracing::warn!(
                session_id = %self.session_id,
                step = n,
                "completing a step that was never started"
            );
        }

        let step = &mut self.steps[idx];
        step.status = StepStatus::Completed;
        step.completed_at = Some(Utc::now());
        if result.is_some() {
            step.result = result;
        }
        if self.overall_status == SessionStatus::Pending {
            self.overall_status = SessionStatus::InProgress;
        }
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    pub fn add_warning(&mut self, n: usize, warning: String) -> Result<WriteOutcome, ProgressError> {
        let idx = self.index_of(n)?;
        if self.steps[idx].warnings.contains(&warning) {
            return Ok(WriteOutcome::Unchanged);
        }
        self.ensure_writable()?;

        self.steps[idx].warnings.push(warning);
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    /// Fails step `n` and, with it, the whole session.
    pub fn fail_step(&mut self, n: usize, error: String) -> Result<WriteOutcome, ProgressError> {
        let idx = self.index_of(n)?;
        {
            let step = &self.steps[idx];
            if step.status == StepStatus::Failed && step.error.as_deref() == Some(error.as_str()) {
                return Ok(WriteOutcome::Unchanged);
            }
        }
        self.ensure_writable()?;

        let from = self.steps[idx].status;
        StepTransition::validate(n, from, StepStatus::Failed)?;
        if StepTransition::is_anomalous(from, StepStatus::Failed) {
            tracing::warn!(
                session_id = %self.session_id,
                step = n,
                "failing a step that was never started"
            );
        }

        let now = Utc::now();
        let step = &mut self.steps[idx];
        step.status = StepStatus::Failed;
        step.error = Some(error.clone());
        step.completed_at = Some(now);

        self.overall_status = SessionStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    /// Fails the session as a whole. An in-progress step, if any, fails with it.
    pub fn fail(&mut self, error: String) -> Result<WriteOutcome, ProgressError> {
        if self.overall_status == SessionStatus::Failed
            && self.error.as_deref() == Some(error.as_str())
        {
            return Ok(WriteOutcome::Unchanged);
        }
        self.ensure_writable()?;

        if let Some(active) = self.current_in_progress_step() {
            return self.fail_step(active, error);
        }

        self.overall_status = SessionStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    pub fn complete(&mut self) -> Result<WriteOutcome, ProgressError> {
        if self.overall_status == SessionStatus::Completed {
            return Ok(WriteOutcome::Unchanged);
        }
        self.ensure_writable()?;

        let incomplete: Vec<usize> = self
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Completed)
            .map(|s| s.step)
            .collect();
        if !incomplete.is_empty() {
            return Err(ProgressError::IncompleteSteps(incomplete));
        }

        self.overall_status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(WriteOutcome::Applied)
    }

    fn index_of(&self, n: usize) -> Result<usize, ProgressError> {
        if n == 0 || n > self.steps.len() {
            return Err(ProgressError::StepOutOfRange {
                step: n,
                total: self.steps.len(),
            });
        }
        Ok(n - 1)
    }

    fn ensure_writable(&self) -> Result<(), ProgressError> {
        if self.is_terminal() {
            return Err(ProgressError::SessionTerminal {
                session_id: self.session_id.clone(),
                status: self.overall_status,
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn build_steps<S: AsRef<str>>(names: &[S]) -> Vec<Step> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| Step::new(i + 1, name.as_ref()))
        .collect()
}

/// Session ids double as snapshot file names.
pub fn validate_session_id(session_id: &str) -> Result<(), ProgressError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ProgressError::InvalidSessionId(session_id.to_string()))
    }
}
