use artiflow_core::api::{RenderEvent, RunRenderer};
use chrono::Local;
use serde_json::{json, Value};

/// Versioned JSON-lines run events, one object per line on stdout.
pub struct JsonlRenderer {
    pretty_print: bool,
}

impl JsonlRenderer {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_type(event: &RenderEvent) -> &'static str {
        match event {
            RenderEvent::RunStart { .. } => "run.start",
            RenderEvent::StageStart { .. } => "stage.start",
            RenderEvent::TaskStart { .. } => "task.start",
            RenderEvent::TaskRetry { .. } => "task.retry",
            RenderEvent::TaskComplete { .. } => "task.end",
            RenderEvent::StageEnd { .. } => "stage.end",
            RenderEvent::RunEnd { .. } => "run.end",
        }
    }

    fn metadata(event: &RenderEvent) -> Value {
        match event {
            RenderEvent::RunStart {
                pipeline,
                total_stages,
                ..
            } => json!({
                "pipeline": pipeline,
                "total_stages": total_stages,
            }),
            RenderEvent::StageStart {
                step,
                total_stages,
                stage,
                tasks,
                ..
            } => json!({
                "step": step,
                "total_stages": total_stages,
                "stage": stage,
                "tasks": tasks,
            }),
            RenderEvent::TaskStart { step, task, .. } => json!({
                "step": step,
                "task": task,
            }),
            RenderEvent::TaskRetry {
                step,
                task,
                attempt,
                error,
                ..
            } => json!({
                "step": step,
                "task": task,
                "attempt": attempt,
                "error": error,
            }),
            RenderEvent::TaskComplete { step, summary, .. } => json!({
                "step": step,
                "task": summary.task,
                "required": summary.required,
                "status": summary.status,
                "attempts": summary.attempts,
                "duration_ms": summary.duration_ms,
                "error": summary.error,
                "metadata": summary.metadata,
            }),
            RenderEvent::StageEnd {
                step,
                stage,
                success,
                warnings,
                duration_ms,
                ..
            } => json!({
                "step": step,
                "stage": stage,
                "success": success,
                "warnings": warnings,
                "duration_ms": duration_ms,
            }),
            RenderEvent::RunEnd {
                success,
                failed_step,
                error,
                duration_ms,
                ..
            } => json!({
                "success": success,
                "failed_step": failed_step,
                "error": error,
                "duration_ms": duration_ms,
            }),
        }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        json!({
            "v": 1,
            "event_type": Self::event_type(event),
            "ts": Local::now().to_rfc3339(),
            "session_id": event.session_id(),
            "metadata": Self::metadata(event),
        })
    }
}

impl RunRenderer for JsonlRenderer {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        println!("{}", line.unwrap_or_else(|_| "{}".into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiflow_core::api::{TaskStatus, TaskSummary};

    #[test]
    fn run_start_envelope() {
        let renderer = JsonlRenderer::new(false);
        let value = renderer.event_to_json(&RenderEvent::RunStart {
            session_id: "s1".to_string(),
            pipeline: "article".to_string(),
            total_stages: 3,
        });

        assert_eq!(value["v"], 1);
        assert_eq!(value["event_type"], "run.start");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["metadata"]["total_stages"], 3);
        assert!(value["ts"].is_string());
    }

    #[test]
    fn task_end_carries_summary() {
        let renderer = JsonlRenderer::new(false);
        let value = renderer.event_to_json(&RenderEvent::TaskComplete {
            session_id: "s1".to_string(),
            step: 2,
            summary: TaskSummary {
                task: "cover".to_string(),
                required: false,
                status: TaskStatus::Defaulted,
                attempts: 3,
                duration_ms: 12,
                error: Some("503".to_string()),
                metadata: Default::default(),
            },
        });

        assert_eq!(value["event_type"], "task.end");
        assert_eq!(value["metadata"]["status"], "defaulted");
        assert_eq!(value["metadata"]["attempts"], 3);
        assert_eq!(value["metadata"]["required"], false);
    }

    #[test]
    fn run_end_reports_failed_step() {
        let renderer = JsonlRenderer::new(true);
        let value = renderer.event_to_json(&RenderEvent::RunEnd {
            session_id: "s1".to_string(),
            success: false,
            failed_step: Some(2),
            error: Some("boom".to_string()),
            duration_ms: 100,
        });

        assert_eq!(value["event_type"], "run.end");
        assert_eq!(value["metadata"]["failed_step"], 2);
        assert_eq!(value["metadata"]["error"], "boom");
    }
}
