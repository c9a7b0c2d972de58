//! # Serial Communication Module
//!
//! Hosted backend for the handset line.
//!
//! This module handles:
//! - Opening the serial port the handset is wired to (8N1, no flow control)
//! - Non-blocking reads sized by what the driver has buffered
//! - Baud rate changes requested by the autobaud watchdog
//! - Waiting for the transmitter to drain before turning the line around

pub mod port_trait;

pub use port_trait::HandsetPort;

use crate::error::{HandsetError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

/// Default handset device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyACM0", // USB CDC devices
];

/// Serial-port backed handset line
pub struct SerialHandsetPort {
    /// Serial port handle
    port: Box<dyn SerialPort>,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for SerialHandsetPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialHandsetPort")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialHandsetPort {
    /// Open the first usable port among `paths`
    ///
    /// # Errors
    ///
    /// Returns [`HandsetError::SerialPortNotFound`] listing every path tried
    /// if none could be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_handset::serial::SerialHandsetPort;
    ///
    /// let port = SerialHandsetPort::open_with_paths(&["/dev/ttyUSB0"], 400_000)?;
    /// println!("Connected to: {}", port.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_with_paths(paths: &[&str], baud: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud) {
                Ok(port) => {
                    info!("Opened handset line at {} ({} baud)", path, baud);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(HandsetError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with handset line settings
    fn open_port(path: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
        tokio_serial::new(path, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(1))
            .open()
            .map_err(|e| HandsetError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

fn to_io(e: tokio_serial::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

impl HandsetPort for SerialHandsetPort {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port.bytes_to_read().map(|n| n as usize).map_err(to_io)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn is_tx_idle(&mut self) -> io::Result<bool> {
        self.port.bytes_to_write().map(|n| n == 0).map_err(to_io)
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud).map_err(to_io)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(to_io)
    }
}
