//! One client connection, one transaction.
//!
//! A session reads exactly one command from the client and sends it to the
//! device while owning the bridge. If the command expects a result, the
//! session waits for it in the pending table and writes it back. The
//! connection is closed afterwards whatever happened. Timeouts and errors
//! end only this session; the client sees a closed connection with no data.

use crate::message::{CommandMessage, MessageError};
use crate::shutdown::Shutdown;
use crate::state::{BridgeState, SharedBridge};
use crate::transfer::{transfer, TransferError};
use crate::wire::CommandEnvelope;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The device's result was written back to the client.
    Responded { bytes: usize },
    /// The command was delivered and expects no result.
    NoResponse,
    /// The client, the device, or the result was too slow.
    TimedOut,
    /// The gateway shut down mid-session.
    Cancelled,
    /// Bad client input or an I/O failure.
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed command from client: {0}")]
    Malformed(#[from] MessageError),

    #[error("sending to the device failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("client I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serve one accepted connection to completion.
pub async fn handle_connection<C>(
    state: SharedBridge,
    mut client: C,
    peer: SocketAddr,
    mut shutdown: Shutdown,
) -> SessionOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let session_id = Uuid::new_v4();
    let span = info_span!("session", id = %session_id, %peer);

    async move {
        info!("Client connected");

        let outcome = if shutdown.is_cancelled() {
            SessionOutcome::Cancelled
        } else {
            tokio::select! {
                _ = shutdown.cancelled() => SessionOutcome::Cancelled,
                served = serve(&state, &mut client) => served.unwrap_or_else(|e| {
                    warn!(error = %e, "Session failed");
                    SessionOutcome::Failed
                }),
            }
        };

        if let Err(e) = client.shutdown().await {
            debug!(error = %e, "Client already gone");
        }
        info!(?outcome, "Connection closed");
        outcome
    }
    .instrument(span)
    .await
}

async fn serve<C>(state: &BridgeState, client: &mut C) -> Result<SessionOutcome, SessionError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let settings = state.settings();

    let command = match timeout(settings.network_timeout, CommandMessage::read(client)).await {
        Ok(command) => command?,
        Err(_) => {
            warn!("Client sent no command in time");
            return Ok(SessionOutcome::TimedOut);
        }
    };
    let envelope = CommandEnvelope::new(&command, settings.id_width)?;
    debug!(%command, "Command received");

    let bridge = state.lock_bridge().await;
    let deadline = Instant::now() + settings.network_timeout;

    // Only a result filed after this send may answer it.
    if let Some(id) = envelope.awaits() {
        state.pending().discard(id);
    }

    let report = match timeout_at(deadline, transfer(state, &envelope)).await {
        Ok(report) => report?,
        Err(_) => {
            warn!("Device did not accept the command in time");
            return Ok(SessionOutcome::TimedOut);
        }
    };
    debug!(chunks = report.chunks, bytes = report.bytes, "Command sent");

    let Some(id) = envelope.awaits() else {
        return Ok(SessionOutcome::NoResponse);
    };

    let wait = state.pending().wait_for(id, settings.wait_result);
    let result = match timeout_at(deadline, wait).await {
        Ok(result) => result,
        Err(_) => {
            warn!(correlation_id = %id, "No result before the deadline");
            return Ok(SessionOutcome::TimedOut);
        }
    };
    drop(bridge);

    let packed = result.pack();
    client.write_all(&packed).await?;
    client.flush().await?;
    debug!(correlation_id = %id, code = ?result.code(), "Result returned");

    Ok(SessionOutcome::Responded {
        bytes: packed.len(),
    })
}
