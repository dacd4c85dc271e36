//! Framing on the serial link.
//!
//! Every frame starts with one header byte naming its kind:
//!
//! ```text
//! Result  | 0x00 | correlation id (CMD_ID_SIZE) | ResultMessage    |
//! Command | 0x01 | CommandMessage (to device) or ForwardedCommand   |
//! Ack     | 0x02 |
//! ```
//!
//! A command envelope always begins with the same five bytes (header, code,
//! length) which are written as one unit before the body is chunked.

use crate::message::{CommandMessage, ForwardedCommand, MessageError, ResultMessage};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Header byte + command code + length field.
pub const COMMAND_PREFIX_LEN: usize = 5;

/// Kind of a frame, carried in its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Result = 0x00,
    Command = 0x01,
    Ack = 0x02,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Result),
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Ack),
            other => Err(FrameError::UnknownHeader(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(kind: FrameKind) -> Self {
        kind as u8
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Result => "result",
            Self::Command => "command",
            Self::Ack => "ack",
        };
        f.write_str(name)
    }
}

/// Errors that leave the serial framing in an unknown state.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unrecognized frame header {0:#04x}")]
    UnknownHeader(u8),

    #[error("malformed {kind} frame: {source}")]
    Malformed {
        kind: FrameKind,
        #[source]
        source: MessageError,
    },

    #[error("{kind} frame body did not arrive within {timeout:?}")]
    BodyTimeout { kind: FrameKind, timeout: Duration },

    #[error("serial link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Width of a correlation id on the wire, 1 to 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdWidth(u8);

impl IdWidth {
    pub const MAX: u8 = 8;

    pub fn new(bytes: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&bytes).then_some(Self(bytes))
    }

    pub fn bytes(self) -> usize {
        self.0 as usize
    }
}

impl Default for IdWidth {
    fn default() -> Self {
        Self(2)
    }
}

/// Identifier echoed by the device in the result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Decode a big-endian id of up to eight bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= 8);
        Self(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Encode as `width` big-endian bytes, keeping the low-order bytes.
    pub fn to_be_bytes(self, width: IdWidth) -> Vec<u8> {
        self.0.to_be_bytes()[8 - width.bytes()..].to_vec()
    }

    pub async fn read<R>(reader: &mut R, width: IdWidth) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf[..width.bytes()]).await?;
        Ok(Self::from_be_slice(&buf[..width.bytes()]))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A command framed for the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    bytes: Vec<u8>,
    awaits: Option<CorrelationId>,
}

impl CommandEnvelope {
    pub fn new(command: &CommandMessage, width: IdWidth) -> Result<Self, MessageError> {
        let awaits = if command.has_response() {
            Some(command.correlation_id(width)?)
        } else {
            None
        };

        let mut bytes = Vec::with_capacity(1 + command.encoded_len());
        bytes.push(u8::from(FrameKind::Command));
        bytes.extend_from_slice(&command.pack());
        Ok(Self { bytes, awaits })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The indivisible header + code + length prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.bytes[..COMMAND_PREFIX_LEN]
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[COMMAND_PREFIX_LEN..]
    }

    /// Correlation id of the result this command will produce, if any.
    pub fn awaits(&self) -> Option<CorrelationId> {
        self.awaits
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A result frame with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    pub id: CorrelationId,
    pub result: ResultMessage,
}

impl ResultEnvelope {
    pub fn new(id: CorrelationId, result: ResultMessage) -> Self {
        Self { id, result }
    }

    /// Decode the rest of a frame whose `Result` header was already consumed.
    pub async fn read_after_header<R>(reader: &mut R, width: IdWidth) -> Result<Self, MessageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let id = CorrelationId::read(reader, width).await?;
        let result = ResultMessage::read(reader).await?;
        Ok(Self { id, result })
    }

    /// Full frame bytes, header included.
    pub fn pack(&self, width: IdWidth) -> Vec<u8> {
        let mut bytes = vec![u8::from(FrameKind::Result)];
        bytes.extend_from_slice(&self.id.to_be_bytes(width));
        bytes.extend_from_slice(&self.result.pack());
        bytes
    }
}

/// A fully decoded frame from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Result(ResultEnvelope),
    Command(ForwardedCommand),
    Ack,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Result(_) => FrameKind::Result,
            Self::Command(_) => FrameKind::Command,
            Self::Ack => FrameKind::Ack,
        }
    }
}

/// Decode the body that follows a header of the given kind.
pub async fn read_frame_body<R>(
    kind: FrameKind,
    reader: &mut R,
    width: IdWidth,
) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let frame = match kind {
        FrameKind::Ack => return Ok(Frame::Ack),
        FrameKind::Result => ResultEnvelope::read_after_header(reader, width)
            .await
            .map(Frame::Result),
        FrameKind::Command => ForwardedCommand::read(reader).await.map(Frame::Command),
    };
    frame.map_err(|source| FrameError::Malformed { kind, source })
}
