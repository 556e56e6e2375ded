//! Builder for configuring and connecting a session.

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{
    BackoffConfig,
    HeartbeatConfig,
    Session,
    SessionConfig,
    SessionError,
    Shared,
    supervisor,
};
use crate::transport::{SocketOptions, WsUrl};

/// Builder for [`Session`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ddpwire::session::Session;
///
/// let builder = Session::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .protocol_versions(["1", "pre2"])
///     .call_timeout(Some(Duration::from_secs(30)));
/// assert_eq!(builder.config().protocol_versions, vec!["1", "pre2"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a builder with default settings.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Start from an existing configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self { Self { config } }

    /// The configuration built so far.
    #[must_use]
    pub fn config(&self) -> &SessionConfig { &self.config }

    /// Deadline for transport setup plus the DDP handshake.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Protocol versions to offer, most preferred first.
    #[must_use]
    pub fn protocol_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.protocol_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Reconnect back-off.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Client heartbeat; `None` disables it.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: Option<HeartbeatConfig>) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// Deadline applied to every method call.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Largest frame payload accepted or sent.
    #[must_use]
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.config.transport.max_frame_length = len;
        self
    }

    /// Largest reassembled message accepted.
    #[must_use]
    pub fn max_message_size(mut self, len: usize) -> Self {
        self.config.transport.max_message_size = len;
        self
    }

    /// Capacity of each outbound queue lane.
    #[must_use]
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.config.transport.outbox_capacity = capacity;
        self
    }

    /// TCP socket options.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.config.transport.socket_options = options;
        self
    }

    /// Resume token to log in with on every connect.
    #[must_use]
    pub fn resume_token(mut self, token: impl Into<String>) -> Self {
        self.config.resume_token = Some(token.into());
        self
    }

    /// Connect to `url` and wait for the DDP handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] for an invalid URL or a failed
    /// connection, [`SessionError::ConnectTimeout`] when the handshake does
    /// not finish within the connect timeout, and
    /// [`SessionError::VersionMismatch`] when no protocol version is agreed.
    pub async fn connect(self, url: &str) -> Result<Session, SessionError> {
        let url = WsUrl::parse(url)?;
        let config = self.config.normalized();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(config, url, outbound_tx));
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(supervisor::run(Arc::clone(&shared), outbound_rx, ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(Session::from_parts(shared, handle)),
            Ok(Err(err)) => {
                shared.shutdown.cancel();
                if let Err(join) = handle.await {
                    debug!(error = %join, "session supervisor ended abnormally");
                }
                Err(err)
            }
            Err(_) => {
                if let Err(join) = handle.await {
                    debug!(error = %join, "session supervisor ended abnormally");
                }
                Err(SessionError::Closed)
            }
        }
    }
}
