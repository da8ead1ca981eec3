use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "artiflow", version, about = "Run staged artifact pipelines")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.artiflow/config.toml, then ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline definition (TOML).
    #[arg(long)]
    pub pipeline: PathBuf,

    /// Session id; a random UUID when omitted.
    #[arg(long)]
    pub session: Option<String>,

    /// Template input available to tasks as `{{key}}` (KEY=VALUE).
    /// Can be specified multiple times.
    #[arg(long = "input", action = clap::ArgAction::Append)]
    pub input: Vec<String>,

    /// Overrides `[output] format`.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(long)]
    pub ascii: bool,

    /// Print one line per event instead of progress bars.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    pub session_id: String,

    #[arg(long, value_enum, default_value_t = StatusFormat::Text)]
    pub format: StatusFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Pipeline definition served by the trigger and retry routes.
    #[arg(long)]
    pub pipeline: PathBuf,

    /// Overrides `[http_server] host`.
    #[arg(long)]
    pub host: Option<String>,

    /// Overrides `[http_server] port`.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new session.
    Run(RunArgs),
    /// Re-run an existing session from its first stage.
    Retry(RunArgs),
    /// Print the progress of a session.
    Status(StatusArgs),
    /// Serve progress polling and run triggers over HTTP.
    Serve(ServeArgs),
}
