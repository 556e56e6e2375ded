//! Error types for the framing layer.
//!
//! This module provides a structured error taxonomy that distinguishes between
//! framing errors (wire-level header problems), protocol errors (violations of
//! the message-level rules after frame extraction), I/O errors, and EOF
//! conditions.
//!
//! # Error Categories
//!
//! - [`FramingError`]: Wire-level issues in frame structure (oversized frames, lengths that
//!   overflow, reserved opcodes, malformed control frames).
//! - [`ProtocolError`]: Message-level violations found while reassembling fragments (stray
//!   continuations, oversized messages, invalid UTF-8).
//! - [`EofError`]: End-of-stream conditions distinguishing clean closure from truncation.
//! - [`CodecError`]: Top-level enum wrapping all categories plus I/O errors.
//!
//! # Recovery Policies
//!
//! Each error has a default [`RecoveryPolicy`] accessible via
//! [`CodecError::default_recovery_policy`]:
//!
//! - [`RecoveryPolicy::Drop`]: Discard the offending frame and continue.
//! - [`RecoveryPolicy::Disconnect`]: Terminate the transport.

use std::io;

use thiserror::Error;

use crate::frame::CloseCode;

/// How the transport should react to a codec error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Discard the offending frame and keep reading.
    Drop,
    /// Close the transport.
    Disconnect,
}

/// Framing-level errors occurring while parsing a frame header.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Declared payload length exceeds the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// A 64-bit length with the most significant bit set, or one that does
    /// not fit in memory on this platform.
    #[error("frame length overflows: {declared}")]
    LengthOverflow {
        /// Length value read from the header.
        declared: u64,
    },

    /// The opcode nibble is reserved by RFC 6455.
    #[error("reserved opcode: {opcode:#x}")]
    ReservedOpcode {
        /// Raw opcode nibble.
        opcode: u8,
    },

    /// A control frame was fragmented or longer than 125 bytes.
    #[error("invalid control frame: opcode {opcode:#x}, length {len}")]
    InvalidControlFrame {
        /// Raw opcode nibble.
        opcode: u8,
        /// Declared payload length.
        len: u64,
    },
}

/// Message-level errors found after frame extraction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A continuation frame arrived with no fragmented message open.
    #[error("continuation frame without an open message")]
    UnexpectedContinuation,

    /// A new data frame arrived while a fragmented message was still open.
    #[error("data frame interleaved with an open fragmented message")]
    InterleavedDataFrame,

    /// The reassembled message would exceed the configured limit.
    #[error("message exceeds max size: {size} > {max}")]
    MessageTooLarge {
        /// Size the message would reach.
        size: usize,
        /// Maximum allowed message size.
        max: usize,
    },

    /// A text message was not valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

/// EOF handling variants distinguishing normal vs. premature closure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// Clean EOF at a frame boundary.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// EOF received while a payload was being read.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Declared payload size.
        expected: usize,
    },

    /// EOF received while the header was being read.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Header size required for the bytes seen so far.
        header_size: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use ddpwire::codec::{CodecError, ProtocolError, RecoveryPolicy};
///
/// let err = CodecError::Protocol(ProtocolError::UnexpectedContinuation);
///
/// assert_eq!(err.default_recovery_policy(), RecoveryPolicy::Drop);
/// assert!(!err.should_disconnect());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Message assembly error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns the recommended recovery policy for this error.
    ///
    /// # Default Policies
    ///
    /// | Error Type | Policy |
    /// |------------|--------|
    /// | `Protocol::UnexpectedContinuation` | `Drop` |
    /// | `Protocol::InterleavedDataFrame` | `Drop` |
    /// | Other `Protocol` errors | `Disconnect` |
    /// | All `Framing` errors | `Disconnect` |
    /// | All `Io` errors | `Disconnect` |
    /// | All `Eof` errors | `Disconnect` |
    #[must_use]
    pub fn default_recovery_policy(&self) -> RecoveryPolicy {
        match self {
            Self::Protocol(
                ProtocolError::UnexpectedContinuation | ProtocolError::InterleavedDataFrame,
            ) => RecoveryPolicy::Drop,
            Self::Protocol(_) | Self::Framing(_) | Self::Io(_) | Self::Eof(_) => {
                RecoveryPolicy::Disconnect
            }
        }
    }

    /// Returns true if this error represents a clean connection close.
    ///
    /// # Examples
    ///
    /// ```
    /// use ddpwire::codec::{CodecError, EofError};
    ///
    /// let err = CodecError::Eof(EofError::CleanClose);
    /// assert!(err.is_clean_close());
    ///
    /// let err = CodecError::Eof(EofError::MidFrame {
    ///     bytes_received: 100,
    ///     expected: 200,
    /// });
    /// assert!(!err.is_clean_close());
    /// ```
    #[must_use]
    pub fn is_clean_close(&self) -> bool { matches!(self, Self::Eof(EofError::CleanClose)) }

    /// Returns true if the transport should be terminated.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        self.default_recovery_policy() == RecoveryPolicy::Disconnect
    }

    /// Close code to send to the peer when failing the connection.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::Framing(FramingError::OversizedFrame { .. })
            | Self::Protocol(ProtocolError::MessageTooLarge { .. }) => CloseCode::MESSAGE_TOO_BIG,
            Self::Protocol(ProtocolError::InvalidUtf8) => CloseCode::INVALID_PAYLOAD,
            Self::Framing(_) | Self::Protocol(_) => CloseCode::PROTOCOL_ERROR,
            Self::Io(_) | Self::Eof(_) => CloseCode::ABNORMAL,
        }
    }

    /// Returns the error category as a string for logging and metrics.
    ///
    /// # Returns
    ///
    /// One of: `"framing"`, `"protocol"`, `"io"`, or `"eof"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
