//! Command dispatch.

use artiflow_core::api::{AppConfig, CliError};

use crate::commands::cli::Commands;
use crate::commands::{run, status};
use crate::http;

pub async fn dispatch(cmd: Commands, cfg: AppConfig) -> Result<i32, CliError> {
    match cmd {
        Commands::Run(args) => run::run_cmd(args, cfg, false).await,
        Commands::Retry(args) => run::run_cmd(args, cfg, true).await,
        Commands::Status(args) => status::status_cmd(args, cfg).await,
        Commands::Serve(args) => http::handle_serve(args, cfg).await,
    }
}
