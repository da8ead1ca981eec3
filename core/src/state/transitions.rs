//! Step status transition rules

use super::types::StepStatus;
use crate::error::TransitionError;

pub struct StepTransition;

impl StepTransition {
    /// Validate a step status change.
    ///
    /// Steps only move forward: `pending -> in_progress -> {completed, failed}`.
    /// `pending -> completed` and `pending -> failed` are accepted so that a
    /// caller finishing a step it never started is reported as an anomaly
    /// rather than rejected.
    pub fn validate(step: usize, from: StepStatus, to: StepStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { step, state: from });
        }

        let is_valid = matches!(
            (from, to),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::Pending, StepStatus::Completed)
                | (StepStatus::Pending, StepStatus::Failed)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { step, from, to })
        }
    }

    /// `pending -> {completed, failed}` skips the in_progress state.
    pub fn is_anomalous(from: StepStatus, to: StepStatus) -> bool {
        from == StepStatus::Pending && to.is_terminal()
    }
}
