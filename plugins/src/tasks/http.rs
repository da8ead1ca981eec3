//! HTTP plumbing shared by the network-backed tasks.

use std::time::Duration;

use artiflow_core::api::TaskError;
use reqwest::StatusCode;
use serde_json::Value;

const BODY_PREVIEW_LIMIT: usize = 512;

/// How a non-success HTTP status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatusClass {
    Success,
    /// 408, 429 and 5xx: worth another attempt.
    Retryable,
    Permanent,
}

impl HttpStatusClass {
    pub fn of(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::Retryable
        } else {
            Self::Permanent
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Transport failures (connect, timeout) are transient; anything else about
/// the request itself is fatal.
pub(crate) fn classify_reqwest(err: reqwest::Error, url: &str) -> TaskError {
    let msg = format!("request to {url} failed: {err}");
    if err.is_timeout() || err.is_connect() {
        TaskError::Transient(msg)
    } else if let Some(status) = err.status() {
        classify_status(status, url, "")
    } else if err.is_decode() || err.is_builder() {
        TaskError::Fatal(msg)
    } else {
        TaskError::Transient(msg)
    }
}

pub(crate) fn classify_status(status: StatusCode, url: &str, body: &str) -> TaskError {
    let msg = format!("{url} returned {status}: {}", preview_body(body));
    match HttpStatusClass::of(status) {
        HttpStatusClass::Retryable => TaskError::Transient(msg),
        _ => TaskError::Fatal(msg),
    }
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

/// Read a JSON body, mapping non-2xx statuses through [`classify_status`].
pub(crate) async fn parse_json_response(resp: reqwest::Response) -> Result<Value, TaskError> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| classify_reqwest(err, &url))?;

    if !status.is_success() {
        return Err(classify_status(status, &url, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|err| {
        TaskError::Fatal(format!(
            "failed to decode response from {url}: {err} | body={}",
            preview_body(&body)
        ))
    })
}
