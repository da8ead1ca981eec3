use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artiflow_core::api::{
    AppConfig, AppContext, Orchestrator, OutputConfig, Pipeline, RunRenderer, StageSpec,
};

use crate::artifact::ArtifactBundle;
use crate::definition::{CompletionSettings, PipelineDefinition, TaskDefinition, TaskKind};
use crate::executor::{JsonlRenderer, TextRenderer};
use crate::tasks::{
    ArtifactTask, CommandAction, CompletionAction, CompletionClient, RemoteJobAction, TaskOptions,
    UploadAction,
};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

pub fn build_renderer(output: &OutputConfig, progress: bool) -> Arc<dyn RunRenderer> {
    match output.format.as_str() {
        "jsonl" => Arc::new(JsonlRenderer::new(false)),
        // Anything other than jsonl renders as text.
        _ => Arc::new(TextRenderer::new(output.ascii_only).with_progress(progress)),
    }
}

pub fn build_context(cfg: AppConfig, progress: bool) -> Result<AppContext> {
    let renderer = build_renderer(&cfg.output, progress);
    let ctx = AppContext::new(cfg).context("failed to open progress store")?;
    Ok(ctx.with_renderer(renderer))
}

fn build_completion_client(settings: &CompletionSettings) -> Result<CompletionClient> {
    let api_key = std::env::var(&settings.api_key_env).unwrap_or_else(|_| {
        tracing::warn!(
            env = %settings.api_key_env,
            "completion API key not set; requests will be unauthenticated"
        );
        String::new()
    });
    CompletionClient::new(
        &settings.base_url,
        api_key,
        settings.model.clone(),
        Duration::from_millis(settings.timeout_ms),
    )
}

fn task_options(task: &TaskDefinition, cfg: &AppConfig) -> TaskOptions {
    let base = if task.required {
        TaskOptions::required(&task.name)
    } else {
        TaskOptions::optional(&task.name, task.default.clone())
    };
    TaskOptions {
        retry: task.retry_options(&cfg.retry),
        timeout: task.timeout_ms.map(Duration::from_millis),
        ..base
    }
}

fn build_task(
    task: &TaskDefinition,
    cfg: &AppConfig,
    completion: &mut Option<Arc<CompletionClient>>,
    settings: &CompletionSettings,
) -> Result<ArtifactTask> {
    let opts = task_options(task, cfg);
    let request_timeout =
        Duration::from_millis(task.timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS));

    let built = match &task.kind {
        TaskKind::Completion {
            prompt,
            system,
            model,
        } => {
            let client = match completion {
                Some(client) => client.clone(),
                None => {
                    let client = Arc::new(build_completion_client(settings)?);
                    *completion = Some(client.clone());
                    client
                }
            };
            ArtifactTask::new(
                opts,
                CompletionAction::new(client, prompt.clone(), system.clone(), model.clone()),
            )
        }
        TaskKind::Command {
            program,
            args,
            output,
            workdir,
        } => ArtifactTask::new(
            opts,
            CommandAction::new(
                program.clone(),
                args.clone(),
                output.clone(),
                workdir
                    .as_deref()
                    .map(|w| PathBuf::from(shellexpand::tilde(w).into_owned())),
            ),
        ),
        TaskKind::Upload {
            source,
            url,
            content_type,
        } => ArtifactTask::new(
            opts,
            UploadAction::new(source.clone(), url.clone(), content_type.clone(), request_timeout)?,
        ),
        TaskKind::Job {
            submit_url,
            status_url,
            payload,
            poll_interval_ms,
            deadline_ms,
        } => ArtifactTask::new(
            opts,
            RemoteJobAction::new(
                submit_url.clone(),
                status_url.clone(),
                payload.clone(),
                Duration::from_millis(*poll_interval_ms),
                Duration::from_millis(*deadline_ms),
                request_timeout,
            )?,
        ),
    };
    Ok(built)
}

/// Materialize a validated definition into runnable stages.
pub fn build_pipeline(def: &PipelineDefinition, cfg: &AppConfig) -> Result<Pipeline<ArtifactBundle>> {
    def.validate()?;

    let mut completion = None;
    let mut pipeline = Pipeline::new(def.name.clone());
    for stage in &def.stages {
        let mut spec = StageSpec::new(stage.name.clone(), ArtifactBundle::absorb);
        if let Some(description) = &stage.description {
            spec = spec.describe(description.clone());
        }
        for task in &stage.tasks {
            let built = build_task(task, cfg, &mut completion, &def.completion)
                .with_context(|| format!("failed to build task '{}'", task.name))?;
            spec = spec.task(built);
        }
        pipeline = pipeline.stage(spec);
    }

    tracing::debug!(
        pipeline = %def.name,
        stages = pipeline.len(),
        "pipeline built"
    );
    Ok(pipeline)
}

pub fn build_orchestrator(
    ctx: &AppContext,
    def: &PipelineDefinition,
) -> Result<Orchestrator<ArtifactBundle>> {
    let pipeline = build_pipeline(def, ctx.cfg())?;
    Ok(ctx.orchestrator(pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiflow_core::api::ProgressBackend;

    const DEF: &str = r#"
name = "demo"

[[stages]]
name = "draft"
description = "Draft text"

[[stages.tasks]]
name = "outline"
kind = "completion"
prompt = "Outline {{topic}}"

[[stages.tasks]]
name = "summary"
kind = "completion"
prompt = "Summarize {{topic}}"
required = false

[[stages]]
name = "publish"

[[stages.tasks]]
name = "push"
kind = "upload"
source = "outline"
url = "http://localhost:1/{{session}}"
"#;

    fn memory_cfg() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.progress.backend = ProgressBackend::Memory;
        cfg
    }

    #[test]
    fn builds_stages_in_order() {
        let def = PipelineDefinition::parse(DEF).unwrap();
        let pipeline = build_pipeline(&def, &memory_cfg()).unwrap();

        assert_eq!(pipeline.name(), "demo");
        assert_eq!(pipeline.stage_names(), vec!["draft", "publish"]);
        let draft = &pipeline.stages()[0];
        assert_eq!(draft.description(), Some("Draft text"));
        assert_eq!(draft.task_names(), vec!["outline", "summary"]);
    }

    #[test]
    fn renderer_follows_output_format() {
        let mut output = OutputConfig::default();
        assert_eq!(build_renderer(&output, false).format(), "text");
        output.format = "jsonl".to_string();
        assert_eq!(build_renderer(&output, true).format(), "jsonl");
    }

    #[tokio::test]
    async fn context_uses_configured_store() {
        let ctx = build_context(memory_cfg(), false).unwrap();
        let def = PipelineDefinition::parse(DEF).unwrap();
        let orchestrator = build_orchestrator(&ctx, &def).unwrap();

        assert_eq!(orchestrator.pipeline().len(), 2);
        assert!(ctx.store().list().await.is_empty());
    }
}
