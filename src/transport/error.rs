//! Error types for the WebSocket transport.

use std::{io, time::Duration};

use thiserror::Error;

use crate::codec::{CodecError, FramingError};

/// Failures while performing the HTTP upgrade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The status line was missing or not `101`.
    #[error("unexpected upgrade response status: {0}")]
    BadStatus(String),

    /// A required upgrade header was missing or had the wrong value.
    #[error("missing or invalid `{0}` header in upgrade response")]
    MissingHeader(&'static str),

    /// The server's `Sec-WebSocket-Accept` did not match the request key.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch {
        /// Value derived from the request key.
        expected: String,
        /// Value returned by the server.
        actual: String,
    },

    /// The response head exceeded the size limit.
    #[error("upgrade response head exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Maximum accepted response head size.
        limit: usize,
    },

    /// The peer closed the connection before finishing the response head.
    #[error("connection closed during upgrade")]
    ConnectionClosed,
}

/// Errors raised by the WebSocket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl {
        /// Input that failed to parse.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL scheme is neither `ws` nor `wss`.
    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),

    /// A `wss://` URL was given but the crate was built without TLS.
    #[error("wss:// requires the `tls` feature")]
    TlsUnavailable,

    /// Socket configuration or connection failed.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The HTTP upgrade failed.
    #[error("upgrade handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The HTTP upgrade did not finish in time.
    #[error("upgrade handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Reading or decoding frames failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The stream ended without a close handshake.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    /// The writer task has stopped and no more frames can be sent.
    #[error("transport writer has shut down")]
    WriterClosed,
}

impl TransportError {
    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } | Self::UnsupportedScheme(_) | Self::TlsUnavailable => "config",
            Self::Connect(_) => "connect",
            Self::Handshake(_) | Self::HandshakeTimeout(_) => "handshake",
            Self::Codec(err) => err.error_type(),
            Self::StreamClosed | Self::WriterClosed => "closed",
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::StreamClosed,
            io::ErrorKind::InvalidData
                if err.get_ref().is_some_and(|inner| inner.is::<FramingError>()) =>
            {
                match err.into_inner().map(|inner| inner.downcast::<FramingError>()) {
                    Some(Ok(framing)) => Self::Codec(CodecError::Framing(*framing)),
                    _ => Self::StreamClosed,
                }
            }
            _ => Self::Codec(CodecError::Io(err)),
        }
    }
}
