//! Closed set of artifact kinds produced by plugin tasks, and the bundle that
//! carries them from stage to stage.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use artiflow_core::api::{PipelineError, StageOutputs};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Completion {
        text: String,
        #[serde(default)]
        model: String,
    },
    Document {
        path: PathBuf,
        #[serde(default)]
        bytes: u64,
    },
    Upload {
        url: String,
        status: u16,
    },
    Job {
        job_id: String,
        #[serde(default)]
        result: Value,
    },
    Empty,
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completion { .. } => "completion",
            Self::Document { .. } => "document",
            Self::Upload { .. } => "upload",
            Self::Job { .. } => "job",
            Self::Empty => "empty",
        }
    }

    /// Text substituted for `{{name}}` in templates.
    pub fn as_text(&self) -> String {
        match self {
            Self::Completion { text, .. } => text.clone(),
            Self::Document { path, .. } => path.display().to_string(),
            Self::Upload { url, .. } => url.clone(),
            Self::Job { result, .. } => match result {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
            Self::Empty => String::new(),
        }
    }
}

/// Running context of the plugin pipeline: user inputs plus every artifact
/// produced so far, keyed by task name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
}

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("PLACEHOLDER_REGEX is valid")
    })
}

impl ArtifactBundle {
    pub fn new(inputs: BTreeMap<String, String>) -> Self {
        Self {
            inputs,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, artifact: Artifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    /// Replace `{{name}}` with the named artifact, or the named input when no
    /// artifact has that name. Unknown placeholders are left untouched.
    pub fn render(&self, template: &str) -> String {
        placeholder()
            .replace_all(template, |caps: &Captures<'_>| {
                let key = &caps[1];
                if let Some(artifact) = self.artifacts.get(key) {
                    artifact.as_text()
                } else if let Some(input) = self.inputs.get(key) {
                    input.clone()
                } else {
                    tracing::debug!(placeholder = key, "unresolved template placeholder");
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    /// Stage aggregator: later stages see every output under its task name.
    pub fn absorb(mut self, outputs: StageOutputs<Artifact>) -> Result<Self, PipelineError> {
        for (name, artifact) in outputs {
            if self.artifacts.contains_key(&name) {
                return Err(PipelineError::internal(format!(
                    "artifact '{name}' produced twice"
                )));
            }
            self.artifacts.insert(name, artifact);
        }
        Ok(self)
    }
}
