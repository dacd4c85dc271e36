//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use crate::wire::IdWidth;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link configuration
    pub serial: SerialConfig,
    /// TCP listener configuration
    pub server: ServerConfig,
    /// Bridge protocol configuration
    pub bridge: BridgeConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.device.trim().is_empty() {
            return Err(ConfigError::validation("serial.device", "must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be positive"));
        }
        if self.bridge.chunk_size == 0 {
            return Err(ConfigError::validation("bridge.chunk_size", "must be positive"));
        }
        if IdWidth::new(self.bridge.cmd_id_size).is_none() {
            return Err(ConfigError::validation(
                "bridge.cmd_id_size",
                format!("must be between 1 and {}", IdWidth::MAX),
            ));
        }
        if self.bridge.forward_queue == 0 {
            return Err(ConfigError::validation("bridge.forward_queue", "must be positive"));
        }

        let durations = [
            ("serial.timeout_ms", self.serial.timeout_ms),
            ("serial.frame_timeout_ms", self.serial.frame_timeout_ms),
            ("server.network_timeout_ms", self.server.network_timeout_ms),
            ("server.wait_result_ms", self.server.wait_result_ms),
            (
                "server.forward_connect_timeout_ms",
                self.server.forward_connect_timeout_ms,
            ),
            ("bridge.result_ttl_ms", self.bridge.result_ttl_ms),
            ("bridge.eviction_interval_ms", self.bridge.eviction_interval_ms),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(ConfigError::validation(key, "must be greater than zero"));
            }
        }
        Ok(())
    }
}

/// Serial link configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Bound on one idle header poll (`SERIAL_TIMEOUT`)
    pub timeout_ms: u64,
    /// Bound on reading a frame body once its header arrived
    pub frame_timeout_ms: u64,
    /// Pause between header polls, yielding the link to writers
    pub poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout_ms: 100,
            frame_timeout_ms: 1000,
            poll_interval_ms: 5,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parameters for opening the device.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.frame_timeout(),
        }
    }
}

/// TCP listener configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
    /// Bound on one client transaction (`NETWORK_TIMEOUT`)
    pub network_timeout_ms: u64,
    /// Poll granularity while waiting for a result (`WAIT_RESULT`)
    pub wait_result_ms: u64,
    /// Connect timeout when forwarding device-originated commands
    pub forward_connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1236,
            network_timeout_ms: 10_000,
            wait_result_ms: 50,
            forward_connect_timeout_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn wait_result(&self) -> Duration {
        Duration::from_millis(self.wait_result_ms)
    }

    pub fn forward_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_connect_timeout_ms)
    }
}

/// Bridge protocol configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Largest body chunk sent before waiting for an ack (`UART_SEND_BYTES`)
    pub chunk_size: usize,
    /// Correlation id width in bytes (`CMD_ID_SIZE`)
    pub cmd_id_size: u8,
    /// Unclaimed results older than this are evicted
    pub result_ttl_ms: u64,
    /// How often the eviction sweep runs
    pub eviction_interval_ms: u64,
    /// Device-originated commands buffered for forwarding
    pub forward_queue: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64,
            cmd_id_size: 2,
            result_ttl_ms: 30_000,
            eviction_interval_ms: 1000,
            forward_queue: 32,
        }
    }
}

impl BridgeConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_millis(self.result_ttl_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
