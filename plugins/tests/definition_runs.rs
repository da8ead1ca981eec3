use std::collections::BTreeMap;
use std::sync::Arc;

use artiflow_core::api::{
    AppConfig, AppContext, ProgressManager, RunOutcome, SessionStatus, StepStatus,
};
use artiflow_plugins::factory::build_orchestrator;
use artiflow_plugins::{Artifact, ArtifactBundle, PipelineDefinition};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::json;

fn definition(base: &str, upload_attempts: u32) -> PipelineDefinition {
    let raw = format!(
        r#"
name = "article"

[completion]
base_url = "{base}/v1"
api_key_env = "ARTIFLOW_TEST_UNSET_KEY"
model = "test-model"

[[stages]]
name = "draft"

[[stages.tasks]]
name = "outline"
kind = "completion"
prompt = "Outline {{{{topic}}}}"

[[stages.tasks]]
name = "cover"
kind = "job"
required = false
submit_url = "{base}/jobs"
status_url = "{base}/jobs/{{{{job_id}}}}"
poll_interval_ms = 5
deadline_ms = 200
default = {{ kind = "empty" }}

[[stages]]
name = "publish"

[[stages.tasks]]
name = "push"
kind = "upload"
source = "outline"
url = "{base}/cdn/{{{{session}}}}.txt"
retry = {{ max_attempts = {upload_attempts}, delay_ms = 1, backoff = false }}
"#
    );
    PipelineDefinition::parse(&raw).unwrap()
}

fn bundle(session: &str) -> ArtifactBundle {
    let mut inputs = BTreeMap::new();
    inputs.insert("topic".to_string(), "tides".to_string());
    inputs.insert("session".to_string(), session.to_string());
    ArtifactBundle::new(inputs)
}

fn context() -> AppContext {
    AppContext::with_store(AppConfig::default(), Arc::new(ProgressManager::new()))
}

async fn mock_completion(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "messages": [{ "role": "user", "content": "Outline tides" }]
        })))
        .with_status(200)
        .with_body(
            json!({
                "model": "test-model",
                "choices": [{ "message": { "content": "1. Moon\n2. Sun" } }]
            })
            .to_string(),
        )
        .create_async()
        .await
}

#[tokio::test]
async fn optional_job_failure_defaults_and_run_completes() {
    let mut server = mockito::Server::new_async().await;
    let completion = mock_completion(&mut server).await;
    let submit = server
        .mock("POST", "/jobs")
        .with_status(400)
        .with_body("bad payload")
        .create_async()
        .await;
    let upload = server
        .mock("PUT", "/cdn/s-ok.txt")
        .match_body("1. Moon\n2. Sun")
        .with_status(201)
        .create_async()
        .await;

    let ctx = context();
    let def = definition(&server.url(), 1);
    let orchestrator = build_orchestrator(&ctx, &def).unwrap();

    let outcome = orchestrator.trigger("s-ok", bundle("s-ok")).await.unwrap();

    completion.assert_async().await;
    submit.assert_async().await;
    upload.assert_async().await;

    let RunOutcome::Completed { context } = outcome else {
        panic!("expected completed run");
    };
    assert_eq!(context.get("cover"), Some(&Artifact::Empty));
    assert!(matches!(context.get("push"), Some(Artifact::Upload { status: 201, .. })));

    let view = ctx.store().view("s-ok").await.unwrap();
    assert_eq!(view.overall_status, SessionStatus::Completed);
    let warnings = view.steps[0].warnings.clone().unwrap_or_default();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("cover"));
}

#[tokio::test]
async fn exhausted_upload_fails_publish_step() {
    let mut server = mockito::Server::new_async().await;
    let _completion = mock_completion(&mut server).await;
    let _submit = server
        .mock("POST", "/jobs")
        .with_status(400)
        .create_async()
        .await;
    let upload = server
        .mock("PUT", "/cdn/s-bad.txt")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let ctx = context();
    let def = definition(&server.url(), 2);
    let orchestrator = build_orchestrator(&ctx, &def).unwrap();

    let outcome = orchestrator.trigger("s-bad", bundle("s-bad")).await.unwrap();

    upload.assert_async().await;
    match outcome {
        RunOutcome::Failed { step, error, .. } => {
            assert_eq!(step, Some(2));
            assert!(error.contains("push"), "{error}");
        }
        other => panic!("expected failure, got completed: {}", other.is_completed()),
    }

    let session = ctx.store().read("s-bad").await.unwrap();
    assert_eq!(session.overall_status, SessionStatus::Failed);
    assert_eq!(session.steps[0].status, StepStatus::Completed);
    assert_eq!(session.steps[1].status, StepStatus::Failed);
}
