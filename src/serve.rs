//! JSON-lines request loop.
//!
//! Each input line is one [`ExecutionRequest`]
//! (`{"tool", "params", "sessionId", "useCache"}`); each answer is one
//! [`ResponseEnvelope`] line. Requests are handled in order.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use toolkeep_commons::ErrorCategory;
use toolkeep_core::{ExecutionRequest, ExecutionService};
use toolkeep_exec_events::{EnvelopeMetadata, ErrorBody, ResponseEnvelope, json};
use tracing::{debug, warn};

/// Answer requests from `reader` until end of input or `shutdown` fires.
/// An in-flight call is cancelled on shutdown and still gets its answer.
/// Returns the number of requests answered.
pub async fn serve_lines<R, W>(
    service: &ExecutionService,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut answered = 0;

    loop {
        let line = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read request line")?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope = answer(service, line, shutdown.child_token()).await;
        let mut payload =
            json::to_string(&envelope).context("Failed to encode response envelope")?;
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .await
            .context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
        answered += 1;
    }

    debug!(answered, "request loop finished");
    Ok(answered)
}

/// Envelope for a single request line.
pub async fn answer(
    service: &ExecutionService,
    line: &str,
    cancel: CancellationToken,
) -> ResponseEnvelope {
    match serde_json::from_str::<ExecutionRequest>(line) {
        Ok(request) => service
            .execute_tool_with_cancellation(request, cancel)
            .await
            .to_envelope(),
        Err(err) => {
            warn!(error = %err, "rejected malformed request line");
            ResponseEnvelope::error(
                ErrorBody::new(ErrorCategory::Validation, format!("malformed request: {err}")),
                EnvelopeMetadata::new("", 0, Utc::now()),
            )
        }
    }
}
