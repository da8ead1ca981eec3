use std::time::Duration;

use artiflow_core::api::{TaskError, TaskInput, TaskResult};
use async_trait::async_trait;

use super::http::{build_client, classify_reqwest, classify_status};
use super::ArtifactAction;
use crate::artifact::{Artifact, ArtifactBundle};

/// Uploads an earlier artifact with HTTP PUT.
pub struct UploadAction {
    http: reqwest::Client,
    source: String,
    url: String,
    content_type: Option<String>,
}

impl UploadAction {
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        content_type: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            source: source.into(),
            url: url.into(),
            content_type,
        })
    }

    async fn payload(&self, bundle: &ArtifactBundle) -> Result<Vec<u8>, TaskError> {
        match bundle.get(&self.source) {
            Some(Artifact::Document { path, .. }) => tokio::fs::read(path).await.map_err(|e| {
                TaskError::fatal(format!("cannot read document {}: {e}", path.display()))
            }),
            Some(Artifact::Completion { text, .. }) => Ok(text.clone().into_bytes()),
            Some(other) => Err(TaskError::fatal(format!(
                "artifact '{}' of kind {} cannot be uploaded",
                self.source,
                other.kind()
            ))),
            None => Err(TaskError::fatal(format!(
                "artifact '{}' is not available",
                self.source
            ))),
        }
    }
}

#[async_trait]
impl ArtifactAction for UploadAction {
    fn kind(&self) -> &'static str {
        "upload"
    }

    async fn run(
        &self,
        _input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError> {
        let body = self.payload(bundle).await?;
        let url = bundle.render(&self.url);
        let size = body.len();

        let mut req = self.http.put(&url).body(body);
        if let Some(ct) = &self.content_type {
            req = req.header(reqwest::header::CONTENT_TYPE, ct);
        }
        tracing::debug!(url = %url, bytes = size, "uploading artifact");

        let resp = req.send().await.map_err(|err| classify_reqwest(err, &url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &url, &body));
        }

        Ok(TaskResult::ok(Artifact::Upload {
            url,
            status: status.as_u16(),
        })
        .with_metadata("bytes", size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> TaskInput {
        TaskInput {
            session_id: "s".into(),
            step: 3,
            stage_name: "publish".into(),
            task_name: "upload".into(),
            attempt: 1,
        }
    }

    fn bundle() -> ArtifactBundle {
        let mut bundle = ArtifactBundle::default();
        bundle.insert(
            "draft",
            Artifact::Completion {
                text: "final text".into(),
                model: "m".into(),
            },
        );
        bundle
    }

    #[tokio::test]
    async fn puts_completion_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/bucket/s.txt")
            .match_body("final text")
            .match_header("content-type", "text/plain")
            .with_status(201)
            .create_async()
            .await;

        let action = UploadAction::new(
            "draft",
            format!("{}/bucket/s.txt", server.url()),
            Some("text/plain".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = action.run(&input(), &bundle()).await.unwrap();

        mock.assert_async().await;
        assert!(matches!(
            result.into_result().unwrap(),
            Artifact::Upload { status: 201, .. }
        ));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", "/bucket/x")
            .with_status(503)
            .create_async()
            .await;

        let action = UploadAction::new(
            "draft",
            format!("{}/bucket/x", server.url()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = action.run(&input(), &bundle()).await.unwrap_err();
        assert!(matches!(err, TaskError::Transient(_)));
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let action =
            UploadAction::new("nope", "http://127.0.0.1:9/x", None, Duration::from_secs(1)).unwrap();
        let err = action.run(&input(), &bundle()).await.unwrap_err();
        assert_eq!(err, TaskError::fatal("artifact 'nope' is not available"));
    }
}
