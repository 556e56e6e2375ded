//! Session error types.

use std::time::Duration;

use thiserror::Error;

use crate::{message::WireError, transport::TransportError};

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport setup or I/O failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The handshake did not finish in time.
    #[error("DDP handshake timed out after {0:?}")]
    ConnectTimeout(Duration),
    /// The server kept proposing versions already tried.
    #[error("protocol version negotiation failed: server proposed {proposed}, tried {tried:?}")]
    VersionMismatch {
        /// Version the server asked for last.
        proposed: String,
        /// Versions already offered.
        tried: Vec<String>,
    },
    /// The session has been closed.
    #[error("session is closed")]
    Closed,
    /// The transport ended before the handshake completed.
    #[error("connection lost during handshake")]
    NotConnected,
    /// A message could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl SessionError {
    /// Short label for metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.error_type(),
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::Closed => "closed",
            Self::NotConnected => "not_connected",
            Self::Wire(_) => "wire",
        }
    }
}
