//! Serial transport layer.
//!
//! Opens the physical device through tokio-serial and exposes it to the bridge
//! as a `SerialLink`. An in-memory mock pair stands in for the device in tests.

pub mod async_port;
pub mod error;
pub mod mock;
pub mod traits;

pub use async_port::{list_ports, TokioSerialPort};
pub use error::PortError;
pub use mock::{mock_pair, AckMode, MockDevice, MockSerialPort, ReceivedCommand};
pub use traits::*;
