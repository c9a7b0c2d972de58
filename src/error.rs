//! # Error Types
//!
//! Custom error types for the CRSF handset engine using `thiserror`.

use thiserror::Error;

/// Main error type for the handset crate
#[derive(Debug, Error)]
pub enum HandsetError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate serial ports could be opened
    #[error("No serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Session log serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the handset crate
pub type Result<T> = std::result::Result<T, HandsetError>;

/// Link-level faults.
///
/// These are handled inside the engine (counted, logged, recovered from) and
/// never surface through the collaborator interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Declared frame length is outside `[4, 64]`
    #[error("framing error: declared length {len} out of range")]
    Framing { len: usize },

    /// Checksum mismatch
    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Crc { expected: u8, actual: u8 },

    /// Not enough room in the output FIFO
    #[error("output queue full: need {needed} bytes, {free} free")]
    QueueFull { needed: usize, free: usize },

    /// Watchdog found no healthy traffic while connected
    #[error("handset link lost")]
    LinkLost,
}
