//! Port-specific error types.
//!
//! Defines error types for serial port operations, separate from link-level
//! errors so the backend can be swapped (real hardware or mock) without the
//! link layer caring where an error came from.

use std::io::ErrorKind;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed or is not supported by the backend.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// How the link layer should react to a port error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The connection is still usable; log and keep going.
    Transient,
    /// The connection is gone and must be torn down.
    Fatal,
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error as recoverable or fatal.
    ///
    /// Read timeouts, would-block, interrupted calls and line-level data
    /// errors (parity, framing, overrun) are transient. Anything else,
    /// including a bare `EIO` from a yanked USB adapter, is fatal.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io(e) => io_severity(e.kind()),
            Self::Serial(e) => match e.kind() {
                serialport::ErrorKind::Io(kind) => io_severity(kind),
                _ => ErrorSeverity::Fatal,
            },
            Self::NotFound(_) | Self::Config(_) | Self::NotOpen => ErrorSeverity::Fatal,
        }
    }

    /// Shorthand for `severity() == ErrorSeverity::Fatal`.
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Whether this error means the device could not be reached at open time.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied),
            Self::Serial(e) => matches!(
                e.kind(),
                serialport::ErrorKind::NoDevice
                    | serialport::ErrorKind::Io(ErrorKind::NotFound)
                    | serialport::ErrorKind::Io(ErrorKind::PermissionDenied)
            ),
            _ => false,
        }
    }
}

fn io_severity(kind: ErrorKind) -> ErrorSeverity {
    match kind {
        ErrorKind::TimedOut
        | ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::InvalidData => ErrorSeverity::Transient,
        _ => ErrorSeverity::Fatal,
    }
}
