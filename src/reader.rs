//! The serial reader loop.
//!
//! Owns every read from the link. Each poll takes the serial lock, waits up
//! to `serial_timeout` for a header byte and, if one arrives, reads the
//! whole frame before letting go of the lock. Frames are then routed:
//! results into the pending table, device-originated commands to the
//! forwarding queue, acks to the chunk sender.
//!
//! Anything that breaks framing is fatal. There is no way to resynchronize
//! a byte stream without delimiters, so the loop stops and the gateway
//! shuts down.

use crate::message::ForwardedCommand;
use crate::shutdown::Shutdown;
use crate::state::SharedBridge;
use crate::wire::{read_frame_body, Frame, FrameError, FrameKind};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

/// Result of a single poll of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No header arrived within the poll timeout.
    Idle,
    /// A complete frame was read and routed.
    Handled(FrameKind),
}

pub struct SerialReader {
    state: SharedBridge,
    forward: mpsc::Sender<ForwardedCommand>,
}

impl SerialReader {
    pub fn new(state: SharedBridge, forward: mpsc::Sender<ForwardedCommand>) -> Self {
        Self { state, forward }
    }

    /// Read and route at most one frame.
    pub async fn poll_once(&self) -> Result<PollOutcome, FrameError> {
        let settings = self.state.settings();

        let frame = {
            let mut link = self.state.lock_serial().await;

            let header = match timeout(settings.serial_timeout, link.read_u8()).await {
                Err(_) => return Ok(PollOutcome::Idle),
                Ok(header) => header?,
            };
            let kind = FrameKind::try_from(header)?;

            let body = read_frame_body(kind, &mut **link, settings.id_width);
            match timeout(settings.frame_timeout, body).await {
                Ok(frame) => frame?,
                Err(_) => {
                    return Err(FrameError::BodyTimeout {
                        kind,
                        timeout: settings.frame_timeout,
                    })
                }
            }
        };

        let kind = frame.kind();
        self.dispatch(frame);
        Ok(PollOutcome::Handled(kind))
    }

    fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Result(envelope) => {
                let id = envelope.id;
                if let Err(e) = self.state.pending().file(envelope) {
                    warn!(correlation_id = %id, error = %e, "Dropping duplicate result");
                }
            }
            Frame::Command(command) => {
                let destination = command.destination();
                match self.forward.try_send(command) {
                    Ok(()) => debug!(%destination, "Queued device command for forwarding"),
                    Err(TrySendError::Full(_)) => {
                        warn!(%destination, "Forwarding queue full, dropping device command")
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(%destination, "Forwarder stopped, dropping device command")
                    }
                }
            }
            Frame::Ack => self.state.signal_ack(),
        }
    }

    /// Poll until cancelled or the framing breaks.
    ///
    /// Returns `Ok` on cancellation and the fatal error otherwise.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<(), FrameError> {
        let poll_interval = self.state.settings().poll_interval;
        info!(link = %self.state.link_name(), "Serial reader started");

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(PollOutcome::Idle) => trace!("Serial link idle"),
                Ok(PollOutcome::Handled(kind)) => trace!(%kind, "Frame handled"),
                Err(e) => {
                    error!(error = %e, "Serial link desynchronized, stopping reader");
                    return Err(e);
                }
            }

            // Leave the link free for a moment so writers get the lock.
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(poll_interval) => {}
            }
        }

        info!("Serial reader stopped");
        Ok(())
    }
}
