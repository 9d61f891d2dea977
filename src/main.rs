//! toolkeep - stateful tool execution over shared sessions
//!
//! Thin binary entry point that delegates to the CLI handlers.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use toolkeep::StartupContext;
use toolkeep::args::{Cli, Commands};

mod cli;
mod main_helpers;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env (non-fatal if missing)
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let (workspace, manager) = StartupContext::load_config(&args)?;

    if let Err(err) = main_helpers::initialize_tracing(&manager.config().debug) {
        eprintln!("warning: {err:#}");
    }

    let startup = StartupContext::start(workspace, manager, args.force_memory).await?;

    match &args.command {
        Commands::Exec(exec_args) => cli::handle_exec_command(&startup, exec_args).await,
        Commands::Serve => {
            cli::handle_serve_command(&startup).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sessions { command } => {
            cli::handle_sessions_command(&startup, command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache { command } => {
            cli::handle_cache_command(&startup, command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe => {
            cli::handle_probe_command(&startup)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
