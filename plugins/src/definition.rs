//! TOML pipeline definitions.
//!
//! ```toml
//! name = "article"
//!
//! [completion]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//!
//! [[stages]]
//! name = "draft"
//!
//! [[stages.tasks]]
//! name = "outline"
//! kind = "completion"
//! prompt = "Outline an article about {{topic}}"
//! retry = { max_attempts = 3, delay_ms = 500 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use artiflow_core::api::{RetryConfig, RetryOptions};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub completion: CompletionSettings,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Per-task retry policy; falls back to `[retry]` of the app config.
    #[serde(default)]
    pub retry: Option<RetryDefinition>,
    /// Per-attempt timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Output substituted when an optional task fails.
    #[serde(default)]
    pub default: Option<Artifact>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDefinition {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: bool,
    #[serde(default)]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff() -> bool {
    true
}

impl RetryDefinition {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions::new(self.max_attempts, self.delay_ms)
            .with_backoff(self.backoff)
            .with_max_delay_ms(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    Completion {
        prompt: String,
        #[serde(default)]
        system: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        output: String,
        #[serde(default)]
        workdir: Option<String>,
    },
    Upload {
        /// Name of an earlier task whose artifact is uploaded.
        source: String,
        url: String,
        #[serde(default)]
        content_type: Option<String>,
    },
    Job {
        submit_url: String,
        status_url: String,
        #[serde(default)]
        payload: Option<String>,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
        #[serde(default = "default_job_deadline_ms")]
        deadline_ms: u64,
    },
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_job_deadline_ms() -> u64 {
    600_000
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion { .. } => "completion",
            Self::Command { .. } => "command",
            Self::Upload { .. } => "upload",
            Self::Job { .. } => "job",
        }
    }
}

impl TaskDefinition {
    pub fn retry_options(&self, fallback: &RetryConfig) -> RetryOptions {
        match &self.retry {
            Some(retry) => retry.to_options(),
            None => RetryOptions::from_config(fallback),
        }
    }
}

impl PipelineDefinition {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline file {}", path.display()))?;
        let def = Self::parse(&raw)
            .with_context(|| format!("invalid pipeline file {}", path.display()))?;
        Ok(def)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let def: Self = toml::from_str(raw).context("failed to parse pipeline TOML")?;
        def.validate()?;
        Ok(def)
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }

    /// Structural checks that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            bail!("pipeline '{}' has no stages", self.name);
        }

        let mut stage_names = HashSet::new();
        let mut produced: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                bail!("duplicate stage name '{}'", stage.name);
            }
            if stage.tasks.is_empty() {
                bail!("stage '{}' has no tasks", stage.name);
            }

            let mut in_stage = Vec::new();
            for task in &stage.tasks {
                if produced.contains(task.name.as_str()) || in_stage.contains(&task.name.as_str()) {
                    bail!("duplicate task name '{}'", task.name);
                }
                if task.required && task.default.is_some() {
                    bail!("required task '{}' cannot declare a default", task.name);
                }
                if task.timeout_ms == Some(0) {
                    bail!("task '{}' has timeout_ms = 0", task.name);
                }
                match &task.kind {
                    TaskKind::Upload { source, .. } if !produced.contains(source.as_str()) => {
                        bail!(
                            "upload task '{}' references '{}', which is not produced by an earlier stage",
                            task.name,
                            source
                        );
                    }
                    TaskKind::Job {
                        poll_interval_ms,
                        deadline_ms,
                        ..
                    } if *poll_interval_ms == 0 || *deadline_ms == 0 => {
                        bail!("job task '{}' needs non-zero poll interval and deadline", task.name);
                    }
                    _ => {}
                }
                in_stage.push(task.name.as_str());
            }
            produced.extend(in_stage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "article"

[completion]
base_url = "http://localhost:9999/v1"
model = "small"

[[stages]]
name = "draft"
description = "Write the first draft"

[[stages.tasks]]
name = "outline"
kind = "completion"
prompt = "Outline {{topic}}"
retry = { max_attempts = 3, delay_ms = 10 }

[[stages]]
name = "render"

[[stages.tasks]]
name = "pdf"
kind = "command"
program = "pandoc"
args = ["-o", "{{session}}.pdf"]
output = "/tmp/{{session}}.pdf"
timeout_ms = 30000

[[stages.tasks]]
name = "cover"
kind = "job"
required = false
submit_url = "http://img/jobs"
status_url = "http://img/jobs/{{job_id}}"
default = { kind = "empty" }

[[stages]]
name = "publish"

[[stages.tasks]]
name = "upload"
kind = "upload"
source = "pdf"
url = "http://cdn/{{session}}.pdf"
"#;

    #[test]
    fn parses_full_definition() {
        let def = PipelineDefinition::parse(SAMPLE).unwrap();
        assert_eq!(def.stage_names(), vec!["draft", "render", "publish"]);
        assert_eq!(def.completion.model, "small");
        assert_eq!(def.completion.api_key_env, "OPENAI_API_KEY");

        let outline = &def.stages[0].tasks[0];
        assert!(outline.required);
        assert_eq!(outline.kind.as_str(), "completion");
        assert_eq!(outline.retry_options(&RetryConfig::default()).attempts(), 3);

        let cover = &def.stages[1].tasks[1];
        assert!(!cover.required);
        assert_eq!(cover.default, Some(Artifact::Empty));
        match &cover.kind {
            TaskKind::Job {
                poll_interval_ms, ..
            } => assert_eq!(*poll_interval_ms, 2_000),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn missing_retry_falls_back_to_config() {
        let def = PipelineDefinition::parse(SAMPLE).unwrap();
        let pdf = &def.stages[1].tasks[0];
        let cfg = RetryConfig {
            max_attempts: 5,
            ..RetryConfig::default()
        };
        assert_eq!(pdf.retry_options(&cfg).attempts(), 5);
    }

    #[test]
    fn rejects_upload_of_unknown_artifact() {
        let raw = r#"
name = "bad"
[[stages]]
name = "only"
[[stages.tasks]]
name = "push"
kind = "upload"
source = "nothing"
url = "http://cdn/x"
"#;
        let err = PipelineDefinition::parse(raw).unwrap_err();
        assert!(err.to_string().contains("not produced by an earlier stage"));
    }

    #[test]
    fn rejects_duplicate_task_names_and_empty_stages() {
        let dup = r#"
name = "dup"
[[stages]]
name = "a"
[[stages.tasks]]
name = "x"
kind = "completion"
prompt = "p"
[[stages.tasks]]
name = "x"
kind = "completion"
prompt = "q"
"#;
        assert!(PipelineDefinition::parse(dup).is_err());
        assert!(PipelineDefinition::parse("name = \"empty\"").is_err());
    }

    #[test]
    fn bundled_demo_definition_is_valid() {
        let def = PipelineDefinition::parse(include_str!("../../demos/article.toml")).unwrap();
        assert_eq!(def.stage_names(), vec!["outline", "draft", "render", "publish"]);
    }

    #[test]
    fn rejects_unknown_kind() {
        let raw = r#"
name = "k"
[[stages]]
name = "a"
[[stages.tasks]]
name = "x"
kind = "telepathy"
"#;
        assert!(PipelineDefinition::parse(raw).is_err());
    }
}
