use anyhow::{Result, bail};
use toolkeep::StartupContext;
use toolkeep::args::SessionCommands;

use crate::main_helpers::print_json;

pub async fn handle_sessions_command(startup: &StartupContext, command: &SessionCommands) -> Result<()> {
    let service = &startup.service;
    if !startup.backend.is_shared() {
        tracing::warn!("in-process backend selected; only sessions from this process are visible");
    }

    match command {
        SessionCommands::List => {
            for id in service.list_sessions().await? {
                println!("{id}");
            }
        }
        SessionCommands::Show { id, history } => {
            if *history {
                let Some(history) = service.session_history(id).await? else {
                    bail!("session '{id}' not found");
                };
                print_json(&history)?;
            } else {
                let Some(record) = service.session_record(id).await? else {
                    bail!("session '{id}' not found");
                };
                print_json(&record)?;
            }
        }
        SessionCommands::Reset { id } => {
            if !service.reset_session(id).await? {
                bail!("session '{id}' not found");
            }
            println!("session '{id}' reset");
        }
        SessionCommands::Clear { id } => {
            if service.clear_session(id).await? {
                println!("session '{id}' cleared");
            } else {
                println!("session '{id}' did not exist");
            }
        }
        SessionCommands::Extend { id, seconds } => {
            if !service.extend_session(id, *seconds).await? {
                bail!("session '{id}' not found");
            }
            println!("session '{id}' now expires in {seconds}s");
        }
    }
    Ok(())
}
