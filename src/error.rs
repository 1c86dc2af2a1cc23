//! Error handling for linebridge
//!
//! This module defines the crate-level error type, the errors reported at the
//! device boundary, and a Result alias for use throughout the crate.

use thiserror::Error;

/// Main error type for linebridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Opening the serial device failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bridge was already started (or already stopped)
    #[error("Bridge already started")]
    AlreadyStarted,

    /// The worker thread could not be spawned or panicked
    #[error("Worker thread error: {0}")]
    Worker(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for linebridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure to open a serial device
///
/// The link never retries on its own; the bridge decides when to try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to open {port}: {reason}")]
pub struct ConnectionError {
    /// Port the open was attempted on
    pub port: String,
    /// Why the open failed (absent, permission denied, busy, ...)
    pub reason: String,
}

impl ConnectionError {
    pub fn new(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            reason: reason.into(),
        }
    }
}

/// Failure while reading a byte from an open device
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The handle was closed or the device went away
    #[error("Device closed")]
    Closed,
    /// The byte could not be interpreted as part of a text record
    #[error("Undecodable byte 0x{0:02X}")]
    Decode(u8),
    /// No byte arrived before the timeout expired
    #[error("Read timed out")]
    TimedOut,
}

impl ReadError {
    /// Map an I/O error from the serial driver onto the read taxonomy
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                ReadError::TimedOut
            }
            ErrorKind::InvalidData => ReadError::Decode(0),
            _ => ReadError::Closed,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BridgeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Config("baud rate must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: baud rate must be positive"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = BridgeError::Config("test".to_string());
        let with_ctx = err.with_context("Failed to load");
        assert!(with_ctx.to_string().contains("Failed to load"));
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::new("/dev/ttyACM0", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Failed to open /dev/ttyACM0: No such file or directory"
        );

        let wrapped: BridgeError = err.into();
        assert!(wrapped.to_string().contains("/dev/ttyACM0"));
    }

    #[test]
    fn test_read_error_from_io() {
        use std::io::{Error, ErrorKind};
        assert_eq!(
            ReadError::from_io(&Error::from(ErrorKind::TimedOut)),
            ReadError::TimedOut
        );
        assert_eq!(
            ReadError::from_io(&Error::from(ErrorKind::BrokenPipe)),
            ReadError::Closed
        );
        assert!(matches!(
            ReadError::from_io(&Error::from(ErrorKind::InvalidData)),
            ReadError::Decode(_)
        ));
    }

    #[test]
    fn test_result_ext_on_io() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        let err = res.context("Reading config").unwrap_err();
        assert!(err.to_string().starts_with("Reading config"));
    }
}
