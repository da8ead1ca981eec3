use std::collections::BTreeMap;

use artiflow_core::api::{validate_session_id, AppConfig, CliError, RunOutcome};
use artiflow_plugins::factory::{build_context, build_orchestrator};
use artiflow_plugins::{ArtifactBundle, PipelineDefinition};

use crate::commands::cli::{OutputFormat, RunArgs};

/// Input key always bound to the running session id.
pub const SESSION_INPUT: &str = "session";

/// Parse repeated `KEY=VALUE` arguments; later keys win.
pub fn parse_inputs(raw: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    let mut inputs = BTreeMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "invalid --input '{pair}', expected KEY=VALUE"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Config(format!("invalid --input '{pair}', empty key")));
        }
        inputs.insert(key.to_string(), value.to_string());
    }
    Ok(inputs)
}

/// Seed the bundle handed to the first stage.
pub fn initial_bundle(session_id: &str, mut inputs: BTreeMap<String, String>) -> ArtifactBundle {
    inputs
        .entry(SESSION_INPUT.to_string())
        .or_insert_with(|| session_id.to_string());
    ArtifactBundle::new(inputs)
}

pub fn load_definition(path: &std::path::Path) -> Result<PipelineDefinition, CliError> {
    PipelineDefinition::from_path(path).map_err(|e| CliError::Config(format!("{e:#}")))
}

fn wants_progress_bars(args: &RunArgs, cfg: &AppConfig) -> bool {
    !args.no_progress
        && cfg.output.progress_bar
        && cfg.output.format == OutputFormat::Text.as_str()
        && atty::is(atty::Stream::Stderr)
}

/// `artiflow run` / `artiflow retry`. Returns 0 when the session completed and
/// 1 when it failed.
#[tracing::instrument(name = "cli.run", skip(args, cfg), fields(pipeline = %args.pipeline.display()))]
pub async fn run_cmd(args: RunArgs, mut cfg: AppConfig, reset: bool) -> Result<i32, CliError> {
    let definition = load_definition(&args.pipeline)?;
    let inputs = parse_inputs(&args.input)?;

    if let Some(format) = args.format {
        cfg.output.format = format.as_str().to_string();
    }
    if args.ascii {
        cfg.output.ascii_only = true;
    }

    let session_id = args
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    validate_session_id(&session_id)?;

    let progress = wants_progress_bars(&args, &cfg);
    let ctx = build_context(cfg, progress).map_err(|e| CliError::Command(format!("{e:#}")))?;
    let orchestrator =
        build_orchestrator(&ctx, &definition).map_err(|e| CliError::Config(format!("{e:#}")))?;

    tracing::info!(
        session_id = %session_id,
        pipeline = %definition.name,
        reset,
        "starting run"
    );
    let bundle = initial_bundle(&session_id, inputs);
    let outcome = orchestrator.run(&session_id, bundle, reset).await?;

    match outcome {
        RunOutcome::Completed { context } => {
            tracing::debug!(
                session_id = %session_id,
                artifacts = context.artifacts.len(),
                "run completed"
            );
            Ok(0)
        }
        RunOutcome::Failed { step, error, .. } => {
            tracing::debug!(session_id = %session_id, step = ?step, error = %error, "run failed");
            Ok(1)
        }
    }
}
