use anyhow::Result;
use serde_json::json;
use toolkeep::StartupContext;

use crate::main_helpers::print_json;

pub fn handle_probe_command(startup: &StartupContext) -> Result<()> {
    let backend = &startup.backend;
    print_json(&json!({
        "backend": backend.kind,
        "shared": backend.is_shared(),
        "fallbackReason": backend.fallback_reason,
        "configPath": startup.config_path,
        "workspace": startup.workspace,
        "tools": startup.service.registry().names().collect::<Vec<_>>(),
    }))
}
