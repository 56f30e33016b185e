//! Error types for lottery-client.

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Termination was requested through the cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dialing the server failed.
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the connection before sending any byte of a frame.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed frame (bad header, short body, closed mid-frame).
    #[error("Framing error: {0}")]
    Framing(String),

    /// A body length does not fit in the configured header width.
    #[error("Body length {length} does not fit in a {width}-digit header")]
    HeaderOverflow { length: usize, width: usize },

    /// Server response does not match the expected grammar.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(Violation),

    /// A line of the bets file could not be read as a bet.
    #[error("Invalid bet record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// How a message broke the protocol grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
    /// Message text that cannot be read at all.
    #[error("{0}")]
    Malformed(String),

    /// Winners response declared a count different from the documents sent.
    #[error("Expected {expected} winners, got {actual} documents")]
    WinnersMismatch { expected: usize, actual: usize },
}

impl ClientError {
    /// Protocol violation for a malformed message.
    pub fn protocol(reason: impl Into<String>) -> Self {
        ClientError::ProtocolViolation(Violation::Malformed(reason.into()))
    }

    /// Whether this error is the cancellation outcome rather than a failure.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
