//! Chunked, acknowledged transfer of a command envelope to the device.
//!
//! The device has a small receive buffer. The five-byte prefix goes out in
//! one write so the device learns the body length up front. The body then
//! follows in chunks of at most `chunk_size` bytes, and after each chunk the
//! sender waits for one `Ack` frame. The reader loop owns all reads, so acks
//! reach the sender through the relay channel in [`BridgeState`]. The serial
//! lock is held only for the duration of each write.

use crate::state::BridgeState;
use crate::wire::{CommandEnvelope, COMMAND_PREFIX_LEN};
use std::slice::Chunks;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("serial write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("acknowledgement relay closed while waiting for chunk {chunk}")]
    AckChannelClosed { chunk: usize },
}

/// How an envelope is cut up for the wire.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan<'a> {
    prefix: &'a [u8],
    body: &'a [u8],
    chunk_size: usize,
}

impl<'a> ChunkPlan<'a> {
    pub fn new(envelope: &'a [u8], chunk_size: usize) -> Self {
        let (prefix, body) = envelope.split_at(envelope.len().min(COMMAND_PREFIX_LEN));
        Self {
            prefix,
            body,
            chunk_size: chunk_size.max(1),
        }
    }

    /// The indivisible first write.
    pub fn prefix(&self) -> &'a [u8] {
        self.prefix
    }

    /// Body chunks in send order, each at most `chunk_size` long.
    pub fn chunks(&self) -> Chunks<'a, u8> {
        self.body.chunks(self.chunk_size)
    }

    pub fn chunk_count(&self) -> usize {
        self.body.len().div_ceil(self.chunk_size)
    }
}

/// What one successful transfer put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Body chunks sent, each one acknowledged.
    pub chunks: usize,
    /// Total bytes written, prefix included.
    pub bytes: usize,
}

/// Send `envelope` to the device.
///
/// The caller must hold the bridge lock and bound the call with a timeout;
/// a device that stops acknowledging stalls this future indefinitely.
/// Dropping the future mid-transfer releases every lock it holds.
pub async fn transfer(
    state: &BridgeState,
    envelope: &CommandEnvelope,
) -> Result<TransferReport, TransferError> {
    let plan = ChunkPlan::new(envelope.as_bytes(), state.settings().chunk_size);
    let mut acks = state.ack_receiver().await;

    let mut stale = 0usize;
    while acks.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!(stale, "Discarded acknowledgements received outside a transfer");
    }

    write_unit(state, plan.prefix()).await?;
    trace!(bytes = plan.prefix().len(), "Prefix sent");

    let mut report = TransferReport {
        chunks: 0,
        bytes: plan.prefix().len(),
    };

    for (index, chunk) in plan.chunks().enumerate() {
        write_unit(state, chunk).await?;
        trace!(chunk = index, bytes = chunk.len(), "Chunk sent, awaiting ack");

        acks.recv()
            .await
            .ok_or(TransferError::AckChannelClosed { chunk: index })?;

        report.chunks += 1;
        report.bytes += chunk.len();
    }

    debug!(
        chunks = report.chunks,
        bytes = report.bytes,
        "Envelope delivered"
    );
    Ok(report)
}

/// One write and flush under the serial lock.
async fn write_unit(state: &BridgeState, bytes: &[u8]) -> std::io::Result<()> {
    let mut link = state.lock_serial().await;
    link.write_all(bytes).await?;
    link.flush().await
}
