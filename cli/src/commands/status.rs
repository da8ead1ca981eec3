use artiflow_core::api::{
    AppConfig, CliError, ProgressBackend, ProgressManager, ProgressStore, ProgressView,
    SessionStatus, StepStatus,
};

use crate::commands::cli::{StatusArgs, StatusFormat};

fn step_icon(status: StepStatus, ascii: bool) -> &'static str {
    match (status, ascii) {
        (StepStatus::Pending, true) => "[ ]",
        (StepStatus::InProgress, true) => "[~]",
        (StepStatus::Completed, true) => "[ok]",
        (StepStatus::Failed, true) => "[x]",
        (StepStatus::Pending, false) => "⏳",
        (StepStatus::InProgress, false) => "🔄",
        (StepStatus::Completed, false) => "✅",
        (StepStatus::Failed, false) => "❌",
    }
}

pub fn format_view(view: &ProgressView, ascii: bool) -> String {
    let mut out = format!(
        "session {} {} (step {}/{})",
        view.session_id, view.overall_status, view.current_step, view.total_steps
    );
    if let Some(started) = view.started_at {
        out.push_str(&format!(", started {}", started.to_rfc3339()));
    }
    for step in &view.steps {
        out.push_str(&format!(
            "\n  {} {}. {} [{}]",
            step_icon(step.status, ascii),
            step.step,
            step.name,
            step.status
        ));
        if let Some(message) = &step.message {
            out.push_str(&format!(" {message}"));
        }
        if let Some(error) = &step.error {
            out.push_str(&format!("\n      error: {error}"));
        }
        for warning in step.warnings.iter().flatten() {
            out.push_str(&format!("\n      warning: {warning}"));
        }
    }
    if let Some(error) = &view.error {
        out.push_str(&format!("\nerror: {error}"));
    }
    out
}

/// `artiflow status`: 1 when the session failed, 0 otherwise.
pub async fn status_cmd(args: StatusArgs, cfg: AppConfig) -> Result<i32, CliError> {
    if cfg.progress.backend == ProgressBackend::Memory {
        tracing::warn!("progress backend is 'memory'; sessions from other processes are not visible");
    }
    let store = ProgressManager::from_config(&cfg.progress)?;
    let view = store.view(&args.session_id).await?;

    match args.format {
        StatusFormat::Json => {
            let body = serde_json::to_string_pretty(&view)
                .map_err(|e| CliError::Command(format!("failed to encode progress: {e}")))?;
            println!("{body}");
        }
        StatusFormat::Text => println!("{}", format_view(&view, cfg.output.ascii_only)),
    }

    Ok(match view.overall_status {
        SessionStatus::Failed => 1,
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiflow_core::api::{ProgressConfig, ProgressError};

    #[tokio::test]
    async fn reads_snapshot_written_by_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let progress = ProgressConfig {
            backend: ProgressBackend::File,
            directory: Some(dir.path().to_string_lossy().to_string()),
            ..ProgressConfig::default()
        };

        let writer = ProgressManager::from_config(&progress).unwrap();
        let names = vec!["draft".to_string(), "publish".to_string()];
        writer.initialize("s-1", &names, false).await.unwrap();
        writer.start_step("s-1", 1, Some("drafting".into())).await.unwrap();
        writer.fail_step("s-1", 1, "boom".into()).await.unwrap();

        let mut cfg = AppConfig::default();
        cfg.progress = progress;
        cfg.output.ascii_only = true;
        let code = status_cmd(
            StatusArgs {
                session_id: "s-1".into(),
                format: StatusFormat::Text,
            },
            cfg.clone(),
        )
        .await
        .unwrap();
        assert_eq!(code, 1);

        let missing = status_cmd(
            StatusArgs {
                session_id: "nope".into(),
                format: StatusFormat::Json,
            },
            cfg,
        )
        .await;
        assert!(matches!(
            missing,
            Err(CliError::Progress(ProgressError::SessionNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn text_view_lists_steps() {
        let store = ProgressManager::new();
        let names = vec!["draft".to_string(), "publish".to_string()];
        store.initialize("s-2", &names, false).await.unwrap();
        store.start_step("s-2", 1, Some("drafting".into())).await.unwrap();
        store.add_step_warning("s-2", 1, "cover defaulted".into()).await.unwrap();

        let text = format_view(&store.view("s-2").await.unwrap(), true);
        assert!(text.starts_with("session s-2 in_progress (step 1/2)"));
        assert!(text.contains("[~] 1. draft [in_progress] drafting"));
        assert!(text.contains("warning: cover defaulted"));
        assert!(text.contains("[ ] 2. publish [pending]"));
    }
}
