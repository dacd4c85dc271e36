use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::port::PortError;
use crate::wire::FrameError;
use thiserror::Error;

/// A specialized `Result` type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that stop the gateway as a whole.
///
/// Everything that only affects one client is handled inside its session
/// and never surfaces here.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("cannot open serial device: {0}")]
    Port(#[from] PortError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial link desynchronized: {0}")]
    LinkDesynchronized(#[source] FrameError),

    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl GatewayError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Logging(_) => 2,
            Self::Port(_) => 3,
            Self::Bind { .. } | Self::Io(_) => 4,
            Self::LinkDesynchronized(_) => 5,
            Self::TaskFailed(_) => 70,
        }
    }
}
