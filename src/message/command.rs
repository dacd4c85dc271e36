use super::{MessageError, MAX_PAYLOAD_LEN};
use crate::wire::{CorrelationId, IdWidth};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes before a command payload: code (2) + length (2).
pub const COMMAND_HEADER_LEN: usize = 4;

/// Operation requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    AddConnection = 0x0000,
    CallEntrypoint = 0x0001,
    RemoteOutput = 0x0002,
    Load = 0x0003,
    Reset = 0x0004,
    RegisterEntrypoint = 0x0005,
    Output = 0x0006,
}

impl CommandCode {
    /// Whether the device answers this command with a `Result` frame.
    pub fn has_response(self) -> bool {
        !matches!(self, Self::RemoteOutput | Self::Output)
    }
}

impl TryFrom<u16> for CommandCode {
    type Error = MessageError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0000 => Self::AddConnection,
            0x0001 => Self::CallEntrypoint,
            0x0002 => Self::RemoteOutput,
            0x0003 => Self::Load,
            0x0004 => Self::Reset,
            0x0005 => Self::RegisterEntrypoint,
            0x0006 => Self::Output,
            other => return Err(MessageError::UnknownCommandCode(other)),
        })
    }
}

impl From<CommandCode> for u16 {
    fn from(code: CommandCode) -> Self {
        code as u16
    }
}

/// A command addressed to (or issued by) the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    code: CommandCode,
    payload: Vec<u8>,
}

impl CommandMessage {
    pub fn new(code: CommandCode, payload: impl Into<Vec<u8>>) -> Result<Self, MessageError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MessageError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { code, payload })
    }

    /// Read exactly one command from `reader`.
    pub async fn read<R>(reader: &mut R) -> Result<Self, MessageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let code = CommandCode::try_from(reader.read_u16().await?)?;
        let len = reader.read_u16().await? as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(Self { code, payload })
    }

    pub fn code(&self) -> CommandCode {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn has_response(&self) -> bool {
        self.code.has_response()
    }

    /// Correlation id carried in the first `width` bytes of the payload.
    pub fn correlation_id(&self, width: IdWidth) -> Result<CorrelationId, MessageError> {
        let id_bytes = self
            .payload
            .get(..width.bytes())
            .ok_or(MessageError::MissingCorrelationId {
                len: self.payload.len(),
                width: width.bytes(),
            })?;
        Ok(CorrelationId::from_be_slice(id_bytes))
    }

    /// Length of `pack()` output.
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEADER_LEN + self.payload.len()
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&u16::from(self.code).to_be_bytes());
        bytes.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

impl fmt::Display for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({} payload bytes)", self.code, self.payload.len())
    }
}

/// A command the device wants delivered to another node on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedCommand {
    destination: SocketAddrV4,
    command: CommandMessage,
}

impl ForwardedCommand {
    pub fn new(destination: SocketAddrV4, command: CommandMessage) -> Self {
        Self {
            destination,
            command,
        }
    }

    /// Read the destination address followed by one command.
    pub async fn read<R>(reader: &mut R) -> Result<Self, MessageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut ip = [0u8; 4];
        reader.read_exact(&mut ip).await?;
        let port = reader.read_u16().await?;
        let command = CommandMessage::read(reader).await?;
        Ok(Self {
            destination: SocketAddrV4::new(Ipv4Addr::from(ip), port),
            command,
        })
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    pub fn command(&self) -> &CommandMessage {
        &self.command
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + self.command.encoded_len());
        bytes.extend_from_slice(&self.destination.ip().octets());
        bytes.extend_from_slice(&self.destination.port().to_be_bytes());
        bytes.extend_from_slice(&self.command.pack());
        bytes
    }
}
