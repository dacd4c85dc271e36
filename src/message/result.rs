use super::{MessageError, MAX_PAYLOAD_LEN};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes before a result payload: code (1) + length (2).
pub const RESULT_HEADER_LEN: usize = 3;

/// Outcome reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0x00,
    IllegalCommand = 0x01,
    IllegalPayload = 0x02,
    InternalError = 0x03,
    BadRequest = 0x04,
    CryptoError = 0x05,
    GenericError = 0x06,
}

impl TryFrom<u8> for ResultCode {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Ok,
            0x01 => Self::IllegalCommand,
            0x02 => Self::IllegalPayload,
            0x03 => Self::InternalError,
            0x04 => Self::BadRequest,
            0x05 => Self::CryptoError,
            0x06 => Self::GenericError,
            other => return Err(MessageError::UnknownResultCode(other)),
        })
    }
}

/// A result produced by the device for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMessage {
    code: ResultCode,
    payload: Vec<u8>,
}

impl ResultMessage {
    pub fn new(code: ResultCode, payload: impl Into<Vec<u8>>) -> Result<Self, MessageError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MessageError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { code, payload })
    }

    pub async fn read<R>(reader: &mut R) -> Result<Self, MessageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let code = ResultCode::try_from(reader.read_u8().await?)?;
        let len = reader.read_u16().await? as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(Self { code, payload })
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RESULT_HEADER_LEN + self.payload.len());
        bytes.push(self.code as u8);
        bytes.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
