//! uart2ip Library
//!
//! A gateway that lets TCP clients send commands to a single device behind a
//! half-duplex serial link and get the device's asynchronous results back.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `message`: Command and result payload formats
//! - `wire`: Frame kinds, correlation ids and envelopes on the serial link
//! - `transfer`: Chunked, acknowledged transfer of commands to the device
//! - `pending`: Pending-result table keyed by correlation id
//! - `reader`: The loop that owns all reads from the serial link
//! - `session`: One client connection, one transaction
//! - `forward`: Delivery of device-originated commands
//! - `gateway`: Startup, accept loop and orderly shutdown
//! - `state`: Shared bridge state and its two arbitration locks
//! - `port`: Serial transport (tokio-serial and an in-memory mock)
//! - `shutdown`: Cancellation token shared by all tasks
//! - `logging`: Tracing subscriber setup
//! - `error`: Gateway-level errors

pub mod config;
pub mod error;
pub mod forward;
pub mod gateway;
pub mod logging;
pub mod message;
pub mod pending;
pub mod port;
pub mod reader;
pub mod session;
pub mod shutdown;
pub mod state;
pub mod transfer;
pub mod wire;

// Re-export commonly used types for convenience
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use message::{CommandCode, CommandMessage, ForwardedCommand, ResultCode, ResultMessage};
pub use port::{
    mock_pair, AckMode, DataBits, FlowControl, MockDevice, MockSerialPort, Parity,
    PortConfiguration, PortError, SerialHandle, SerialLink, StopBits, TokioSerialPort,
};
pub use session::SessionOutcome;
pub use state::{BridgeSettings, BridgeState, SharedBridge};
pub use wire::{CorrelationId, FrameKind, IdWidth};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
