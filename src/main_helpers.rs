use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use toolkeep_config::DebugConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level; output goes to stderr so stdout stays machine readable.
pub(crate) fn initialize_tracing(debug_cfg: &DebugConfig) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().context("Invalid RUST_LOG directive")?
    } else {
        EnvFilter::try_new(debug_cfg.filter_directive())
            .context("Invalid debug.trace_targets configuration")?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("Failed to initialize tracing: {err}"))?;

    tracing::debug!(
        level = %debug_cfg.trace_level,
        "tracing initialized"
    );
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
