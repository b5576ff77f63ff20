//! Link-level error handling.
//!
//! Every failure that crosses the link boundary is a [`LinkError`]. Errors
//! that are delivered asynchronously (from the I/O thread) travel as a
//! [`LinkErrorCode`] plus a message inside a `LinkEvent::Error`.

use crate::port::PortError;
use std::fmt;
use thiserror::Error;

/// A specialized `Result` type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Unified link error type.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A configuration field is outside its supported domain.
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfiguration { field: &'static str, message: String },

    /// The named port cannot be opened.
    #[error("Device '{port}' is unavailable: {message}")]
    DeviceUnavailable { port: String, message: String },

    /// The device signalled a fault while in use; the link has been torn down.
    #[error("Hardware error: {0}")]
    HardwareError(String),

    /// A recoverable I/O condition that did not clear in time.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// The operation needs an open link.
    #[error("Operation requires a connected link, but the link is disconnected.")]
    NotConnected,

    /// A link with this name is already registered.
    #[error("A link named '{0}' already exists")]
    DuplicateLink(String),

    /// No link with this name is registered.
    #[error("No link named '{0}'")]
    UnknownLink(String),

    /// Reading or writing the settings store failed.
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Classified error code carried by asynchronous error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorCode {
    InvalidConfiguration,
    DeviceUnavailable,
    HardwareError,
    TransientIo,
    NotConnected,
    Other,
}

impl fmt::Display for LinkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::DeviceUnavailable => "DeviceUnavailable",
            Self::HardwareError => "HardwareError",
            Self::TransientIo => "TransientIOError",
            Self::NotConnected => "NotConnected",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

impl LinkError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> LinkErrorCode {
        match self {
            Self::InvalidConfiguration { .. } => LinkErrorCode::InvalidConfiguration,
            Self::DeviceUnavailable { .. } => LinkErrorCode::DeviceUnavailable,
            Self::HardwareError(_) => LinkErrorCode::HardwareError,
            Self::TransientIo(_) => LinkErrorCode::TransientIo,
            Self::NotConnected => LinkErrorCode::NotConnected,
            Self::DuplicateLink(_) | Self::UnknownLink(_) | Self::Settings(_) => {
                LinkErrorCode::Other
            }
        }
    }

    /// Map a port error raised while opening `port`.
    pub(crate) fn from_open(port: &str, err: PortError) -> Self {
        match err {
            PortError::Config(message) => Self::invalid("port", message),
            // Anything else that stops an open, missing or busy, means no device.
            e => Self::DeviceUnavailable {
                port: port.to_string(),
                message: e.to_string(),
            },
        }
    }

    /// Map a port error raised on an open handle.
    pub(crate) fn from_io(err: PortError) -> Self {
        if err.is_fatal() {
            Self::HardwareError(err.to_string())
        } else {
            Self::TransientIo(err.to_string())
        }
    }
}
