use serde::Serialize;

use crate::executor::types::TaskSummary;

/// Observer of a pipeline run (controls console/JSONL output).
pub trait RunRenderer: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn render(&self, event: &RenderEvent);
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
    RunStart {
        session_id: String,
        pipeline: String,
        total_stages: usize,
    },
    StageStart {
        session_id: String,
        step: usize,
        total_stages: usize,
        stage: String,
        tasks: Vec<String>,
    },
    TaskStart {
        session_id: String,
        step: usize,
        task: String,
    },
    TaskRetry {
        session_id: String,
        step: usize,
        task: String,
        attempt: u32,
        error: String,
    },
    TaskComplete {
        session_id: String,
        step: usize,
        summary: TaskSummary,
    },
    StageEnd {
        session_id: String,
        step: usize,
        stage: String,
        success: bool,
        warnings: Vec<String>,
        duration_ms: u64,
    },
    RunEnd {
        session_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_step: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
    },
}

impl RenderEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::RunStart { session_id, .. }
            | Self::StageStart { session_id, .. }
            | Self::TaskStart { session_id, .. }
            | Self::TaskRetry { session_id, .. }
            | Self::TaskComplete { session_id, .. }
            | Self::StageEnd { session_id, .. }
            | Self::RunEnd { session_id, .. } => session_id,
        }
    }
}
