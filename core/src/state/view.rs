//! Read model served to external pollers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{Session, Step};
use super::types::{SessionStatus, StepStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub step: usize,
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub session_id: String,
    pub overall_status: SessionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    pub steps: Vec<StepView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Step> for StepView {
    fn from(step: &Step) -> Self {
        Self {
            step: step.step,
            name: step.name.clone(),
            status: step.status,
            message: step.message.clone(),
            error: step.error.clone(),
            warnings: (!step.warnings.is_empty()).then(|| step.warnings.clone()),
        }
    }
}

impl From<&Session> for ProgressView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            overall_status: session.overall_status,
            current_step: session.current_step(),
            total_steps: session.total_steps(),
            steps: session.steps.iter().map(StepView::from).collect(),
            started_at: session.started_at,
            error: session.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_uses_camel_case_and_omits_empty_fields() {
        let mut session = Session::new("s-9", &["a", "b"]).unwrap();
        session.start_step(1, Some("working".into())).unwrap();
        session.add_warning(1, "slow".into()).unwrap();

        let json = serde_json::to_value(ProgressView::from(&session)).unwrap();
        assert_eq!(json["sessionId"], "s-9");
        assert_eq!(json["overallStatus"], "in_progress");
        assert_eq!(json["currentStep"], 1);
        assert_eq!(json["totalSteps"], 2);
        assert_eq!(json["steps"][0]["warnings"][0], "slow");
        assert!(json["steps"][1].get("warnings").is_none());
        assert!(json.get("error").is_none());
    }
}
