//! Connection state and lifecycle events.

use std::fmt;

/// Connection state of a [`Session`](super::Session).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Opening a transport or waiting for `connected`.
    Connecting,
    /// Handshake complete.
    Connected,
    /// The last connect attempt hit its deadline.
    TimedOut,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::TimedOut => "timed out",
        })
    }
}

/// Lifecycle notifications broadcast by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// First successful handshake.
    Connected {
        /// Server-assigned session id.
        session: String,
    },
    /// The transport was lost; a reconnect follows unless the session closed.
    Disconnected {
        /// Why the transport ended.
        reason: String,
    },
    /// A later handshake succeeded and subscriptions were reissued.
    Reconnected {
        /// New server-assigned session id.
        session: String,
    },
}
