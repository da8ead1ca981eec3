use artiflow_core::api::{validate_session_id, ProgressView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;

use crate::commands::run::initial_bundle;
use crate::http::{models::*, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .route("/api/v1/sessions", get(list_sessions_handler))
        .route("/api/v1/sessions/:id/progress", get(progress_handler))
        .route("/api/v1/sessions/:id/run", post(run_handler))
        .route("/api/v1/sessions/:id/retry", post(retry_handler))
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    state.record_request("/health");
    let (uptime_seconds, requests_handled, runs_started) = state
        .stats
        .read()
        .map(|s| (s.uptime_seconds(), s.requests_total, s.runs_started))
        .unwrap_or_default();

    Json(HealthResponse {
        status: "healthy".into(),
        server_id: state.server_id.clone(),
        pipeline: state.orchestrator.pipeline().name().to_string(),
        active_runs: state.orchestrator.registry().active().len(),
        runs_started,
        uptime_seconds,
        requests_handled,
        timestamp: Local::now().to_rfc3339(),
    })
}

/// POST /api/v1/shutdown
async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.record_request("/api/v1/shutdown");
    let _ = state.shutdown_tx.send(());

    Json(serde_json::json!({
        "success": true,
        "message": "Shutdown signal sent"
    }))
}

/// GET /api/v1/sessions
async fn list_sessions_handler(State(state): State<AppState>) -> Json<SessionList> {
    state.record_request("/api/v1/sessions");
    let sessions = state.orchestrator.store().list().await;
    let mut active = state.orchestrator.registry().active();
    active.sort();
    Json(SessionList { sessions, active })
}

/// GET /api/v1/sessions/:id/progress
async fn progress_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ProgressView>, HttpServerError> {
    state.record_request("/api/v1/sessions/:id/progress");
    let view = state.orchestrator.store().view(&session_id).await?;
    Ok(Json(view))
}

/// POST /api/v1/sessions/:id/run
async fn run_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunAccepted>), HttpServerError> {
    state.record_request("/api/v1/sessions/:id/run");
    let req = body.map(|Json(req)| req).unwrap_or_default();
    start_run(&state, session_id, req, false).await
}

/// POST /api/v1/sessions/:id/retry
async fn retry_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunAccepted>), HttpServerError> {
    state.record_request("/api/v1/sessions/:id/retry");
    let req = body.map(|Json(req)| req).unwrap_or_default();
    start_run(&state, session_id, req, true).await
}

/// Initialize the session synchronously so conflicts surface as 409, then let
/// the run continue in the background.
async fn start_run(
    state: &AppState,
    session_id: String,
    req: RunRequest,
    reset: bool,
) -> Result<(StatusCode, Json<RunAccepted>), HttpServerError> {
    validate_session_id(&session_id).inspect_err(|_| state.record_error())?;

    let bundle = initial_bundle(&session_id, req.inputs);
    let handle = state
        .orchestrator
        .spawn(&session_id, bundle, reset)
        .await
        .inspect_err(|err| {
            state.record_error();
            tracing::warn!(session_id = %session_id, error = %err, "run rejected");
        })?;

    if let Ok(mut stats) = state.stats.write() {
        stats.increment_runs();
    }

    let watched = session_id.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok(outcome) => {
                tracing::info!(
                    session_id = %watched,
                    completed = outcome.is_completed(),
                    "background run finished"
                );
            }
            Err(err) => {
                tracing::error!(session_id = %watched, error = %err, "background run aborted");
            }
        }
    });

    let pipeline = state.orchestrator.pipeline();
    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            success: true,
            progress_url: format!("/api/v1/sessions/{session_id}/progress"),
            session_id,
            pipeline: pipeline.name().to_string(),
            total_steps: pipeline.len(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use artiflow_core::api::{
        AppConfig, AppContext, FnTask, Pipeline, ProgressManager, SessionStatus, StageSpec,
        TaskError, TaskInput, TaskResult,
    };
    use artiflow_plugins::{Artifact, ArtifactBundle};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let outline = FnTask::required("outline", |_: TaskInput, bundle: ArtifactBundle| async move {
            Ok::<_, TaskError>(TaskResult::ok(Artifact::Completion {
                text: bundle.render("about {{topic}}"),
                model: "stub".into(),
            }))
        });
        let pipeline = Pipeline::new("demo")
            .stage(StageSpec::new("draft", ArtifactBundle::absorb).task(outline));

        let ctx = AppContext::with_store(AppConfig::default(), Arc::new(ProgressManager::new()));
        let orchestrator = ctx.orchestrator(pipeline);
        let (shutdown_tx, _) = broadcast::channel(1);
        AppState::new("test-server".into(), ctx, orchestrator, shutdown_tx)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_for_terminal(router: &Router, session_id: &str) -> Value {
        let uri = format!("/api/v1/sessions/{session_id}/progress");
        for _ in 0..100 {
            let (status, view) = send(router, "GET", &uri, "").await;
            assert_eq!(status, StatusCode::OK);
            if view["overallStatus"] == "completed" || view["overallStatus"] == "failed" {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {session_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn trigger_returns_accepted_and_progress_completes() {
        let router = create_router(test_state());

        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/sessions/s-1/run",
            r#"{"inputs":{"topic":"tides"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["total_steps"], 1);
        assert_eq!(body["progress_url"], "/api/v1/sessions/s-1/progress");

        let view = wait_for_terminal(&router, "s-1").await;
        assert_eq!(view["overallStatus"], SessionStatus::Completed.as_str());
        assert_eq!(view["steps"][0]["status"], "completed");

        let (status, list) = send(&router, "GET", "/api/v1/sessions", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["sessions"], serde_json::json!(["s-1"]));
    }

    #[tokio::test]
    async fn second_trigger_conflicts_but_retry_is_accepted() {
        let router = create_router(test_state());

        let (status, _) = send(&router, "POST", "/api/v1/sessions/s-2/run", "{}").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for_terminal(&router, "s-2").await;

        let (status, body) = send(&router, "POST", "/api/v1/sessions/s-2/run", "{}").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "CONFLICT");

        let (status, _) = send(&router, "POST", "/api/v1/sessions/s-2/retry", "").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for_terminal(&router, "s-2").await;
    }

    #[tokio::test]
    async fn unknown_session_is_404_and_bad_id_is_400() {
        let router = create_router(test_state());

        let (status, body) = send(&router, "GET", "/api/v1/sessions/missing/progress", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(&router, "POST", "/api/v1/sessions/.hidden/run", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_shutdown() {
        let state = test_state();
        let mut shutdown_rx = state.shutdown_tx.subscribe();
        let router = create_router(state);

        let (status, health) = send(&router, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["server_id"], "test-server");
        assert_eq!(health["pipeline"], "demo");

        let (status, body) = send(&router, "POST", "/api/v1/shutdown", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(shutdown_rx.try_recv().is_ok());
    }
}
