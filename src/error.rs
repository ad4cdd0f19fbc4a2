//! Error types for the bouncer.
//!
//! This module defines error types for connection-level failures,
//! message parsing failures, and serialization issues.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Conditions that end a single connection.
///
/// Every variant except [`ProtocolError::CapacityExceeded`] is fatal for the
/// connection that produced it. A full send buffer is reported to the caller,
/// who drops the message and keeps the connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer performed an orderly shutdown.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The receive buffer filled up without a line terminator.
    #[error("receive buffer exhausted: no line terminator within {capacity} bytes")]
    BufferExhausted {
        /// Capacity of the receive buffer.
        capacity: usize,
    },

    /// The send buffer cannot hold the bytes being queued.
    #[error("send buffer full: {queued} queued + {requested} requested > {capacity}")]
    CapacityExceeded {
        /// Bytes already waiting to be written.
        queued: usize,
        /// Size of the rejected write.
        requested: usize,
        /// Capacity of the send buffer.
        capacity: usize,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The raw message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },

    /// A message could not be rendered to the wire.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}

impl ProtocolError {
    /// Returns `true` if the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::CapacityExceeded { .. } | ProtocolError::Encode(_)
        )
    }
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// The line ended before a command token was found.
    #[error("missing command")]
    MissingCommand,

    /// Parsing error with context information.
    #[error("parsing failed at position {position}: {context}")]
    ParseContext {
        /// Byte position where parsing failed.
        position: usize,
        /// Description of what was being parsed.
        context: String,
    },
}

/// Errors encountered when serializing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// Rendered line is longer than the allowed limit.
    #[error("message too long: {actual} bytes (limit {limit})")]
    TooLong {
        /// Rendered length in bytes.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// A parameter other than the last cannot be represented on the wire.
    #[error("parameter {index} is empty, contains a space or starts with ':'")]
    InvalidMiddleParam {
        /// Index of the offending parameter.
        index: usize,
    },
}
