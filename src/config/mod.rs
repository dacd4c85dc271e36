//! Configuration module for uart2ip.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART2IP_CONFIG` environment variable (explicit path)
//! 2. `./uart2ip.toml` (current directory)
//! 3. `~/.config/uart2ip/uart2ip.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\uart2ip\uart2ip.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `UART2IP_<SECTION>_<KEY>`, e.g.:
//! - `UART2IP_SERIAL_DEVICE=/dev/ttyACM0`
//! - `UART2IP_SERVER_NETWORK_TIMEOUT_MS=2000`
//! - `UART2IP_BRIDGE_CMD_ID_SIZE=4`
//!
//! # Example
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud_rate = 115200
//! timeout_ms = 100        # SERIAL_TIMEOUT
//!
//! [server]
//! port = 1236
//! network_timeout_ms = 10000  # NETWORK_TIMEOUT
//! wait_result_ms = 50         # WAIT_RESULT
//!
//! [bridge]
//! chunk_size = 64         # UART_SEND_BYTES
//! cmd_id_size = 2         # CMD_ID_SIZE
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{BridgeConfig, Config, LogFormat, LoggingConfig, SerialConfig, ServerConfig};
