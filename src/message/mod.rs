//! Payload formats carried inside bridge frames.
//!
//! The bridge never looks inside a payload beyond what this module exposes:
//! how long a message is, whether a command expects a result, and where the
//! correlation id sits. All integers are big-endian.
//!
//! ```text
//! CommandMessage   | code: u16 | len: u16 | payload[len] |
//! ResultMessage    | code: u8  | len: u16 | payload[len] |
//! ForwardedCommand | ipv4: [u8; 4] | port: u16 | CommandMessage |
//! ```

mod command;
mod result;

pub use command::{CommandCode, CommandMessage, ForwardedCommand, COMMAND_HEADER_LEN};
pub use result::{ResultCode, ResultMessage, RESULT_HEADER_LEN};

use thiserror::Error;

/// Largest payload a single message can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Errors raised while encoding or decoding payload messages.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The command code is not one this gateway understands.
    #[error("unknown command code {0:#06x}")]
    UnknownCommandCode(u16),

    /// The result code is not one this gateway understands.
    #[error("unknown result code {0:#04x}")]
    UnknownResultCode(u8),

    /// Payload does not fit the 16-bit length field.
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte limit")]
    PayloadTooLarge(usize),

    /// A command that expects a result is too short to carry its id.
    #[error("command payload of {len} bytes cannot hold a {width}-byte correlation id")]
    MissingCorrelationId { len: usize, width: usize },

    /// Reading or writing the underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MessageError {
    /// Whether the stream ended before a full message was read.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
