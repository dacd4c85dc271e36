//! Mock serial link for testing.
//!
//! `mock_pair` returns the two ends of an in-memory serial line:
//!
//! - `MockSerialPort` is handed to the bridge as its `SerialLink`.
//! - `MockDevice` plays the device. It can inject bytes towards the gateway and
//!   observe every write call the gateway made, one entry per call, so tests
//!   can check chunk boundaries and not just the byte stream.

use super::traits::SerialLink;
use crate::wire::{FrameKind, COMMAND_PREFIX_LEN};
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Size of the in-memory device→gateway buffer.
const MOCK_BUFFER_SIZE: usize = 4096;

/// Shared record of what the gateway did to the link.
#[derive(Debug, Default)]
struct MockPortState {
    /// Every `poll_write` call, in order.
    write_log: Vec<Vec<u8>>,
    /// Number of flushes observed.
    flushes: usize,
    /// When set, every write fails with `BrokenPipe`.
    fail_writes: bool,
}

/// Gateway-side end of the mock serial line.
pub struct MockSerialPort {
    name: String,
    inbound: DuplexStream,
    writes: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<Mutex<MockPortState>>,
}

/// Device-side end of the mock serial line.
pub struct MockDevice {
    outbound: DuplexStream,
    writes: mpsc::UnboundedReceiver<Vec<u8>>,
    state: Arc<Mutex<MockPortState>>,
}

/// How `MockDevice::accept_command` acknowledges body chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Send one `Ack` frame after every chunk.
    EachChunk,
    /// Swallow chunks without acknowledging them.
    Never,
}

/// One command envelope as the device saw it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    /// The fixed prefix write.
    pub prefix: Vec<u8>,
    /// Every body write, in order.
    pub chunks: Vec<Vec<u8>>,
}

impl ReceivedCommand {
    /// Prefix and chunks stitched back together.
    pub fn envelope(&self) -> Vec<u8> {
        let mut bytes = self.prefix.clone();
        for chunk in &self.chunks {
            bytes.extend_from_slice(chunk);
        }
        bytes
    }

    /// Body length announced by the prefix.
    pub fn declared_len(&self) -> usize {
        declared_body_len(&self.prefix)
    }
}

/// Create a connected gateway/device pair.
///
/// # Example
/// ```
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
/// use uart2ip::port::mock_pair;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let (mut port, mut device) = mock_pair("MOCK0");
///
/// device.send(&[0x02]).await?;
/// assert_eq!(port.read_u8().await?, 0x02);
///
/// port.write_all(b"hello").await?;
/// assert_eq!(device.next_write().await.as_deref(), Some(&b"hello"[..]));
/// # Ok(())
/// # }
/// ```
pub fn mock_pair(name: impl Into<String>) -> (MockSerialPort, MockDevice) {
    let (inbound, outbound) = tokio::io::duplex(MOCK_BUFFER_SIZE);
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(MockPortState::default()));

    let port = MockSerialPort {
        name: name.into(),
        inbound,
        writes: tx,
        state: Arc::clone(&state),
    };
    let device = MockDevice {
        outbound,
        writes: rx,
        state,
    };
    (port, device)
}

impl MockSerialPort {
    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl SerialLink for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inbound).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        state.write_log.push(buf.to_vec());
        // The device end may already be gone; the log still records the write.
        let _ = self.writes.send(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state.lock().flushes += 1;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .finish()
    }
}

impl MockDevice {
    /// Push raw bytes towards the gateway.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outbound.write_all(bytes).await?;
        self.outbound.flush().await
    }

    /// Send a bare `Ack` frame.
    pub async fn send_ack(&mut self) -> io::Result<()> {
        self.send(&[u8::from(FrameKind::Ack)]).await
    }

    /// Wait for the next write call the gateway makes.
    ///
    /// Returns `None` once the gateway side has been dropped.
    pub async fn next_write(&mut self) -> Option<Vec<u8>> {
        self.writes.recv().await
    }

    /// Receive one command envelope: the prefix write, then body chunks until
    /// the declared length is complete, acknowledging per `ack`.
    ///
    /// Returns `None` if the gateway side goes away mid-envelope.
    pub async fn accept_command(&mut self, ack: AckMode) -> Option<ReceivedCommand> {
        let prefix = self.next_write().await?;
        let mut remaining = declared_body_len(&prefix);
        let mut chunks = Vec::new();

        while remaining > 0 {
            let chunk = self.next_write().await?;
            remaining = remaining.saturating_sub(chunk.len());
            chunks.push(chunk);
            if ack == AckMode::EachChunk {
                self.send_ack().await.ok()?;
            }
        }

        Some(ReceivedCommand { prefix, chunks })
    }

    /// Make the gateway's subsequent writes fail, as an unplugged adapter would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Snapshot of every write call so far.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Number of flushes the gateway issued.
    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("writes_seen", &self.state.lock().write_log.len())
            .finish()
    }
}

/// Body length announced by a command-envelope prefix (`header | code | len`).
fn declared_body_len(prefix: &[u8]) -> usize {
    if prefix.len() < COMMAND_PREFIX_LEN {
        return 0;
    }
    u16::from_be_bytes([prefix[3], prefix[4]]) as usize
}
