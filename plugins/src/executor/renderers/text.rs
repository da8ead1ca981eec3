use std::sync::Mutex;

use artiflow_core::api::{ProgressMonitor, RenderEvent, RunRenderer, TaskStatus};

/// Human-readable run output.
///
/// With `progress` enabled, events drive indicatif bars on stderr instead of
/// printing one line per event; the final run line is printed either way.
pub struct TextRenderer {
    ascii_only: bool,
    progress: bool,
    monitor: Mutex<Option<ProgressMonitor>>,
}

impl TextRenderer {
    pub fn new(ascii_only: bool) -> Self {
        Self {
            ascii_only,
            progress: false,
            monitor: Mutex::new(None),
        }
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    fn status_label(&self, status: TaskStatus) -> &'static str {
        match (status, self.ascii_only) {
            (TaskStatus::Succeeded, true) => "OK",
            (TaskStatus::Succeeded, false) => "✅ SUCCESS",
            (TaskStatus::Defaulted, true) => "DEFAULT",
            (TaskStatus::Defaulted, false) => "⚠️ DEFAULTED",
            (TaskStatus::Failed, true) => "FAIL",
            (TaskStatus::Failed, false) => "❌ FAILED",
            (TaskStatus::Panicked, true) => "PANIC",
            (TaskStatus::Panicked, false) => "💥 PANICKED",
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                session_id,
                pipeline,
                total_stages,
            } => format!("RUN START {session_id} (pipeline {pipeline}, stages: {total_stages})"),
            RenderEvent::StageStart {
                session_id,
                step,
                total_stages,
                stage,
                tasks,
            } => format!(
                "STAGE START {session_id} ({step}/{total_stages} {stage}, tasks: {})",
                tasks.join(", ")
            ),
            RenderEvent::TaskStart {
                session_id,
                step,
                task,
            } => format!("TASK START {session_id} (step {step}, task {task})"),
            RenderEvent::TaskRetry {
                session_id,
                step,
                task,
                attempt,
                error,
            } => format!(
                "TASK RETRY {session_id} (step {step}, task {task}, attempt {attempt}): {error}"
            ),
            RenderEvent::TaskComplete {
                session_id,
                step,
                summary,
            } => {
                let mut line = format!(
                    "TASK END {session_id} (step {step}, task {}, status {}, attempts {}, duration {}ms)",
                    summary.task,
                    self.status_label(summary.status),
                    summary.attempts,
                    summary.duration_ms
                );
                if let Some(err) = &summary.error {
                    line.push_str(&format!(": {err}"));
                }
                line
            }
            RenderEvent::StageEnd {
                session_id,
                step,
                stage,
                success,
                warnings,
                duration_ms,
            } => {
                let mut out = format!(
                    "STAGE END {session_id} ({step} {stage}, {}, {duration_ms}ms)",
                    if *success { "ok" } else { "failed" }
                );
                let bullet = if self.ascii_only { "-" } else { "⚠️" };
                for warning in warnings {
                    out.push_str(&format!("\n  {bullet} {warning}"));
                }
                out
            }
            RenderEvent::RunEnd {
                session_id,
                success,
                failed_step,
                error,
                duration_ms,
            } => {
                if *success {
                    format!("RUN END {session_id} (completed, duration {duration_ms}ms)")
                } else {
                    let step = failed_step
                        .map(|s| format!(" at step {s}"))
                        .unwrap_or_default();
                    format!(
                        "RUN END {session_id} (failed{step}, duration {duration_ms}ms): {}",
                        error.as_deref().unwrap_or("unknown error")
                    )
                }
            }
        }
    }

    /// Returns true when the event was consumed by the progress bars.
    fn drive_monitor(&self, event: &RenderEvent) -> bool {
        if !self.progress {
            return false;
        }
        let Ok(mut guard) = self.monitor.lock() else {
            return false;
        };

        match event {
            RenderEvent::RunStart { total_stages, .. } => {
                *guard = Some(ProgressMonitor::new(*total_stages, true, self.ascii_only));
                true
            }
            RenderEvent::StageStart {
                step,
                total_stages,
                stage,
                tasks,
                ..
            } => match guard.as_mut() {
                Some(monitor) => {
                    monitor.start_stage(*step, *total_stages, stage);
                    for task in tasks {
                        monitor.add_task(task);
                    }
                    true
                }
                None => false,
            },
            RenderEvent::TaskStart { .. } => guard.is_some(),
            RenderEvent::TaskRetry { task, attempt, .. } => match guard.as_ref() {
                Some(monitor) => {
                    monitor.retry_task(task, *attempt);
                    true
                }
                None => false,
            },
            RenderEvent::TaskComplete { summary, .. } => match guard.as_mut() {
                Some(monitor) => {
                    let ok = matches!(summary.status, TaskStatus::Succeeded);
                    monitor.complete_task(&summary.task, ok, summary.duration_ms);
                    true
                }
                None => false,
            },
            RenderEvent::StageEnd { warnings, .. } => match guard.as_ref() {
                Some(monitor) => {
                    monitor.finish_stage();
                    // Warnings still go to the console.
                    warnings.is_empty()
                }
                None => false,
            },
            RenderEvent::RunEnd { success, .. } => {
                if let Some(monitor) = guard.take() {
                    monitor.finish(*success);
                }
                false
            }
        }
    }
}

impl RunRenderer for TextRenderer {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        if self.drive_monitor(event) {
            return;
        }
        println!("{}", self.format_event(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiflow_core::api::TaskSummary;

    fn summary(status: TaskStatus, error: Option<&str>) -> TaskSummary {
        TaskSummary {
            task: "outline".to_string(),
            required: true,
            status,
            attempts: 2,
            duration_ms: 5,
            error: error.map(str::to_string),
            metadata: Default::default(),
        }
    }

    #[test]
    fn task_complete_line_includes_status_and_error() {
        let renderer = TextRenderer::new(true);
        let event = RenderEvent::TaskComplete {
            session_id: "s1".to_string(),
            step: 1,
            summary: summary(TaskStatus::Failed, Some("boom")),
        };

        let line = renderer.format_event(&event);
        assert!(line.starts_with("TASK END s1"));
        assert!(line.contains("status FAIL"));
        assert!(line.contains("attempts 2"));
        assert!(line.ends_with(": boom"));
    }

    #[test]
    fn stage_end_lists_warnings() {
        let renderer = TextRenderer::new(true);
        let event = RenderEvent::StageEnd {
            session_id: "s1".to_string(),
            step: 2,
            stage: "render".to_string(),
            success: true,
            warnings: vec!["optional task 'cover' failed".to_string()],
            duration_ms: 12,
        };

        let out = renderer.format_event(&event);
        assert!(out.contains("STAGE END s1 (2 render, ok, 12ms)"));
        assert!(out.contains("\n  - optional task 'cover' failed"));
    }

    #[test]
    fn failed_run_end_names_step() {
        let renderer = TextRenderer::new(false);
        let event = RenderEvent::RunEnd {
            session_id: "s1".to_string(),
            success: false,
            failed_step: Some(2),
            error: Some("task 'b' failed".to_string()),
            duration_ms: 40,
        };

        assert_eq!(
            renderer.format_event(&event),
            "RUN END s1 (failed at step 2, duration 40ms): task 'b' failed"
        );
    }

    #[test]
    fn progress_mode_consumes_stage_events() {
        let renderer = TextRenderer::new(true).with_progress(true);
        assert!(renderer.drive_monitor(&RenderEvent::RunStart {
            session_id: "s1".to_string(),
            pipeline: "p".to_string(),
            total_stages: 1,
        }));
        assert!(renderer.drive_monitor(&RenderEvent::StageStart {
            session_id: "s1".to_string(),
            step: 1,
            total_stages: 1,
            stage: "only".to_string(),
            tasks: vec!["outline".to_string()],
        }));
        assert!(renderer.drive_monitor(&RenderEvent::TaskComplete {
            session_id: "s1".to_string(),
            step: 1,
            summary: summary(TaskStatus::Succeeded, None),
        }));
        assert!(!renderer.drive_monitor(&RenderEvent::RunEnd {
            session_id: "s1".to_string(),
            success: true,
            failed_step: None,
            error: None,
            duration_ms: 1,
        }));
    }
}
