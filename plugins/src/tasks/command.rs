use std::path::PathBuf;
use std::process::Stdio;

use artiflow_core::api::{TaskError, TaskInput, TaskResult};
use async_trait::async_trait;
use tokio::process::Command;

use super::http::preview_body;
use super::ArtifactAction;
use crate::artifact::{Artifact, ArtifactBundle};

/// Renders a document by running an external program.
///
/// `args` and `output` are templates over the bundle. The program must write
/// the document to `output`; a non-zero exit status is a failed result.
pub struct CommandAction {
    program: String,
    args: Vec<String>,
    output: String,
    workdir: Option<PathBuf>,
}

impl CommandAction {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        output: impl Into<String>,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            output: output.into(),
            workdir,
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[async_trait]
impl ArtifactAction for CommandAction {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn run(
        &self,
        input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError> {
        let args: Vec<String> = self.args.iter().map(|a| bundle.render(a)).collect();
        let output = expand_path(&bundle.render(&self.output));

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .env("ARTIFLOW_SESSION_ID", &input.session_id)
            .env("ARTIFLOW_OUTPUT", &output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program = %self.program, args = ?args, output = %output.display(), "spawning command");
        let out = cmd.output().await.map_err(|e| {
            TaskError::fatal(format!("failed to spawn '{}': {e}", self.program))
        })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let code = out
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Ok(TaskResult::failure(format!(
                "'{}' exited with {code}: {}",
                self.program,
                preview_body(&stderr)
            ))
            .with_metadata("exit_code", out.status.code()));
        }

        let meta = tokio::fs::metadata(&output).await.map_err(|e| {
            TaskError::fatal(format!(
                "'{}' succeeded but produced no document at {}: {e}",
                self.program,
                output.display()
            ))
        })?;

        Ok(TaskResult::ok(Artifact::Document {
            path: output,
            bytes: meta.len(),
        })
        .with_metadata("exit_code", 0))
    }
}
