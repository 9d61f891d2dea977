use anyhow::Result;
use toolkeep::StartupContext;
use toolkeep::args::CacheCommands;

pub async fn handle_cache_command(startup: &StartupContext, command: &CacheCommands) -> Result<()> {
    let service = &startup.service;
    if service.cache_stats().is_none() {
        println!("cache is disabled in configuration");
        return Ok(());
    }

    match command {
        CacheCommands::Invalidate { namespace } => {
            let removed = service.invalidate_tool_cache(namespace).await;
            println!("removed {removed} cached result(s) from '{namespace}'");
        }
        CacheCommands::Clear => {
            service.clear_cache().await;
            println!("cache cleared");
        }
    }
    Ok(())
}
