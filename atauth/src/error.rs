//! Error types for atauth.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for atauth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for atauth operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A write was attempted while the transport's write channel was closed.
    #[error("Transport is not available for writing")]
    TransportUnavailable,

    /// Reading from the transport failed; the session is torn down.
    #[error("Transport read failed: {0}")]
    TransportRead(#[source] io::Error),

    /// The challenge between the markers is not valid hex.
    #[error("Malformed challenge: {0}")]
    MalformedChallenge(String),

    /// The pre-shared key does not have the length the MAC requires.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required key length in bytes.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The pre-shared key could not be decoded.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No challenge arrived within the configured wait.
    #[error("Timeout: no challenge received within {0:?}")]
    HandshakeTimeout(Duration),

    /// A serial setting could not be parsed.
    #[error("Invalid serial setting: {0}")]
    InvalidSetting(String),
}
