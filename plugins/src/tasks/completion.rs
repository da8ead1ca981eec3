use std::sync::Arc;
use std::time::Duration;

use artiflow_core::api::{TaskError, TaskInput, TaskResult};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{build_client, classify_reqwest, parse_json_response};
use super::ArtifactAction;
use crate::artifact::{Artifact, ArtifactBundle};

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_key: String,
    default_model: String,
    url_completions: String,
}

impl CompletionClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        default_model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let normalized = base_url.trim_end_matches('/');
        Ok(Self {
            http: build_client(timeout)?,
            api_key,
            default_model,
            url_completions: format!("{normalized}/chat/completions"),
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    /// Returns the first choice's content, the model that answered and the
    /// total token usage when reported.
    pub async fn complete(
        &self,
        model: Option<&str>,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<(String, String, Option<u64>), TaskError> {
        let model = model.unwrap_or(&self.default_model);
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let url = &self.url_completions;
        tracing::debug!(url = %url, model, prompt_len = prompt.len(), "completion request");
        let req = self
            .http
            .post(url)
            .json(&json!({ "model": model, "messages": messages }));
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| classify_reqwest(err, url))?;
        let body = parse_json_response(resp).await?;

        let text = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::fatal(format!("{url} returned no completion choices")))?
            .to_string();
        let answered_by = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string();
        let tokens = body.pointer("/usage/total_tokens").and_then(Value::as_u64);
        Ok((text, answered_by, tokens))
    }
}

pub struct CompletionAction {
    client: Arc<CompletionClient>,
    prompt: String,
    system: Option<String>,
    model: Option<String>,
}

impl CompletionAction {
    pub fn new(
        client: Arc<CompletionClient>,
        prompt: impl Into<String>,
        system: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            prompt: prompt.into(),
            system,
            model,
        }
    }
}

#[async_trait]
impl ArtifactAction for CompletionAction {
    fn kind(&self) -> &'static str {
        "completion"
    }

    async fn run(
        &self,
        _input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError> {
        let prompt = bundle.render(&self.prompt);
        let system = self.system.as_deref().map(|s| bundle.render(s));
        if prompt.trim().is_empty() {
            return Ok(TaskResult::failure("prompt rendered empty"));
        }

        let (text, model, tokens) = self
            .client
            .complete(self.model.as_deref(), system.as_deref(), &prompt)
            .await?;

        let mut result = TaskResult::ok(Artifact::Completion { text, model });
        if let Some(tokens) = tokens {
            result = result.with_metadata("total_tokens", tokens);
        }
        Ok(result)
    }
}
