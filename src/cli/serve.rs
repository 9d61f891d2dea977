use anyhow::Result;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use toolkeep::StartupContext;
use toolkeep::serve::serve_lines;
use tracing::info;

/// Serve stdin until it closes or the process receives Ctrl-C.
pub async fn handle_serve_command(startup: &StartupContext) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        })
    };

    info!(backend = %startup.backend.kind, "serving requests on stdio");
    let answered = serve_lines(
        &startup.service,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await;
    signal.abort();

    let answered = answered?;
    info!(answered, "stdin closed");
    Ok(())
}
