use std::time::Duration;

use artiflow_core::api::{poll_until, PollStatus, TaskError, TaskInput, TaskResult};
use async_trait::async_trait;
use serde_json::Value;

use super::http::{build_client, classify_reqwest, parse_json_response};
use super::ArtifactAction;
use crate::artifact::{Artifact, ArtifactBundle};

/// Submits a job to a remote service and polls it until it is done.
///
/// The submit endpoint must answer with `{"id": ...}`; the status endpoint
/// (a template that may reference `{{job_id}}`) with
/// `{"status": "queued" | "running" | "done" | "failed", "result": ..., "error": ...}`.
pub struct RemoteJobAction {
    http: reqwest::Client,
    submit_url: String,
    status_url: String,
    payload: Option<String>,
    poll_interval: Duration,
    deadline: Duration,
}

impl RemoteJobAction {
    pub fn new(
        submit_url: impl Into<String>,
        status_url: impl Into<String>,
        payload: Option<String>,
        poll_interval: Duration,
        deadline: Duration,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(request_timeout)?,
            submit_url: submit_url.into(),
            status_url: status_url.into(),
            payload,
            poll_interval,
            deadline,
        })
    }

    async fn submit(&self, bundle: &ArtifactBundle) -> Result<String, TaskError> {
        let url = bundle.render(&self.submit_url);
        let body: Value = match &self.payload {
            Some(tpl) => serde_json::from_str(&bundle.render(tpl))
                .map_err(|e| TaskError::fatal(format!("job payload is not valid JSON: {e}")))?,
            None => serde_json::to_value(&bundle.inputs).unwrap_or(Value::Null),
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_reqwest(err, &url))?;
        let answer = parse_json_response(resp).await?;

        match answer.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(TaskError::fatal(format!("{url} did not return a job id"))),
        }
    }

    async fn probe(&self, url: &str) -> Result<PollStatus<Value>, TaskError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| classify_reqwest(err, url))?;
        let status = parse_json_response(resp).await?;

        match status.get("status").and_then(Value::as_str) {
            Some("done") | Some("succeeded") | Some("completed") => Ok(PollStatus::Ready(
                status.get("result").cloned().unwrap_or(Value::Null),
            )),
            Some("failed") | Some("error") | Some("cancelled") => Ok(PollStatus::Failed(
                status
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("remote job failed")
                    .to_string(),
            )),
            _ => Ok(PollStatus::Pending),
        }
    }
}

#[async_trait]
impl ArtifactAction for RemoteJobAction {
    fn kind(&self) -> &'static str {
        "job"
    }

    async fn run(
        &self,
        input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError> {
        let job_id = self.submit(bundle).await?;
        tracing::info!(task = %input.task_name, job_id = %job_id, "remote job submitted");

        let mut scoped = bundle.clone();
        scoped.inputs.insert("job_id".to_string(), job_id.clone());
        let status_url = scoped.render(&self.status_url);

        let result = poll_until(|| self.probe(&status_url), self.poll_interval, self.deadline)
            .await
            .inspect_err(|err| {
                tracing::warn!(job_id = %job_id, error = %err, "remote job did not complete");
            })?;

        Ok(TaskResult::ok(Artifact::Job { job_id: job_id.clone(), result })
            .with_metadata("job_id", job_id))
    }
}
