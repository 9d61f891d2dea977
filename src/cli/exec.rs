use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::Value;
use toolkeep::StartupContext;
use toolkeep::args::ExecArgs;
use toolkeep_core::ExecutionRequest;

use crate::main_helpers::print_json;

/// Run one call and print its envelope. Exits non-zero unless it succeeded.
pub async fn handle_exec_command(startup: &StartupContext, args: &ExecArgs) -> Result<ExitCode> {
    let params: Value = serde_json::from_str(&args.params)
        .with_context(|| format!("--params is not valid JSON: {}", args.params))?;

    let mut request = ExecutionRequest::new(args.tool.as_str(), params).use_cache(!args.no_cache);
    if let Some(session) = &args.session {
        request = request.in_session(session.as_str());
    }

    let envelope = startup.service.execute_tool(request).await.to_envelope();
    print_json(&envelope)?;

    Ok(if envelope.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
