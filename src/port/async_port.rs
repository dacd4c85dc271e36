//! Async serial port implementation using tokio-serial.
//!
//! `TokioSerialPort` is the production `SerialLink`: a thin wrapper that keeps
//! the port name for logging and forwards the tokio I/O traits to the
//! underlying `SerialStream`.

use super::error::PortError;
use super::traits::{PortConfiguration, SerialLink};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Native async serial port implementation using tokio-serial.
pub struct TokioSerialPort {
    /// The underlying tokio-serial stream.
    inner: tokio_serial::SerialStream,
    /// Port name/path for identification.
    name: String,
}

impl TokioSerialPort {
    /// Open a serial port with async I/O support.
    ///
    /// # Example
    /// ```no_run
    /// use uart2ip::port::{PortConfiguration, TokioSerialPort};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = PortConfiguration::default();
    /// let port = TokioSerialPort::open("/dev/ttyUSB0", &config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        let builder = tokio_serial::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.timeout);

        let inner = tokio_serial::SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => PortError::not_found(port_name),
            tokio_serial::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            _ => PortError::Serial(e),
        })?;

        Ok(Self {
            inner,
            name: port_name.to_string(),
        })
    }
}

impl SerialLink for TokioSerialPort {
    fn name(&self) -> &str {
        &self.name
    }
}

impl AsyncRead for TokioSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TokioSerialPort {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for TokioSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSerialPort")
            .field("name", &self.name)
            .finish()
    }
}

/// Describe the serial ports visible to the operating system.
///
/// Each entry is the port path followed by a short description of the
/// hardware behind it, e.g. `/dev/ttyUSB0 (usb 0403:6001 FTDI)`.
pub fn list_ports() -> Result<Vec<String>, PortError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => format!(
                "{} (usb {:04x}:{:04x}{})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.manufacturer
                    .map(|m| format!(" {m}"))
                    .unwrap_or_default()
            ),
            serialport::SerialPortType::PciPort => format!("{} (pci)", port.port_name),
            serialport::SerialPortType::BluetoothPort => format!("{} (bluetooth)", port.port_name),
            serialport::SerialPortType::Unknown => port.port_name,
        })
        .collect())
}
