//! # Error Types
//!
//! This module defines all error types used throughout the library.
//!
//! ## Error Hierarchy
//!
//! The main [`Error`] enum covers all engine-level failure modes:
//!
//! | Variant | Cause | Recoverable? |
//! |---------|-------|--------------|
//! | [`Error::Io`] | Descriptor setup or read failure | No (reopen device) |
//! | [`Error::Config`] | Invalid configuration or argument | No (fix caller) |
//! | [`Error::Protocol`] | Malformed frame or response | Maybe (modem quirk) |
//! | [`Error::Transport`] | The write of a queued request failed | Maybe (retry) |
//! | [`Error::Timeout`] | Service creation did not finish in time | Maybe (retry) |
//! | [`Error::Cancelled`] | Request was cancelled before its response | Yes |
//! | [`Error::DeviceShutdown`] | Device event loop has terminated | No |
//! | [`Error::NotCreated`] | Service has no client id | No |
//! | [`Error::InvalidParam`] | TLV could not be encoded | Yes (fix payload) |
//!
//! A modem answering with a non-zero result code is **not** an [`Error`]. The
//! response is delivered as a [`QmiResult`](crate::QmiResult) and the caller
//! decides how to interpret [`QmiResult::error`](crate::QmiResult::error);
//! some drivers treat particular codes ("no effect") as success.
//!
//! ## Usage Pattern
//!
//! ```no_run
//! use qmilink::prelude::*;
//!
//! async fn query(dms: &Service) -> Result<Option<String>> {
//!     match dms.send(0x0021, None).await {
//!         Ok(result) if result.error().is_none() => Ok(result.get_string(0x01)),
//!         Ok(_) => Ok(None),
//!         Err(Error::Transport(kind)) => {
//!             eprintln!("write failed: {kind:?}");
//!             Ok(None)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```

use std::fmt;
use std::io;

/// Result type alias using the library's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for all library operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error while configuring or reading the descriptor.
    Io(io::Error),

    /// Invalid configuration or argument (e.g. asking for a control-service client).
    Config(ConfigError),

    /// Protocol-level error (malformed frame, unexpected response layout).
    Protocol(ProtocolError),

    /// Writing the request to the descriptor failed.
    ///
    /// The request was dropped from the outbound queue; nothing is retried.
    Transport(io::ErrorKind),

    /// Service creation (discovery plus client id acquisition) timed out.
    Timeout,

    /// The request was cancelled before a response arrived.
    Cancelled,

    /// The device event loop has terminated.
    ///
    /// Occurs when every handle was dropped while an operation was still
    /// pending.
    DeviceShutdown,

    /// The service has no valid client id.
    NotCreated,

    /// A TLV could not be appended (type 0 or value longer than 65535 bytes).
    InvalidParam,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {}", e.message),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Self::Transport(kind) => write!(f, "Write to device failed: {kind}"),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::DeviceShutdown => write!(f, "Device has shut down"),
            Self::NotCreated => write!(f, "Service has no client id"),
            Self::InvalidParam => write!(f, "Invalid TLV parameter"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Protocol-level error
#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
