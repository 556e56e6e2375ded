//! Session configuration.

use std::time::Duration;

use crate::{
    codec::clamp_frame_length,
    message::SUPPORTED_VERSIONS,
    transport::TransportConfig,
};

/// How the reconnect delay grows between attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Always wait `initial_delay`.
    Fixed,
    /// Double the delay after each failed attempt, up to `max_delay`.
    #[default]
    Exponential,
}

/// Reconnect back-off timing.
///
/// # Default Values
/// - `initial_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `policy`: [`BackoffPolicy::Exponential`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth policy.
    pub policy: BackoffPolicy,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            policy: BackoffPolicy::Exponential,
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to at least one millisecond and ensure
    /// `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use ddpwire::session::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    ///     ..BackoffConfig::default()
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before reconnect attempt number `attempt`, counting from zero.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.policy {
            BackoffPolicy::Fixed => self.initial_delay,
            BackoffPolicy::Exponential => {
                let factor = 1_u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                self.initial_delay
                    .checked_mul(factor)
                    .map_or(self.max_delay, |delay| delay.min(self.max_delay))
            }
        }
    }
}

/// Client heartbeat timing.
///
/// A `ping` is sent every `interval`. When nothing has arrived from the
/// server for `interval + timeout`, the transport is considered dead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between pings.
    pub interval: Duration,
    /// Grace period after a missed interval.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(17_500),
            timeout: Duration::from_secs(15),
        }
    }
}

impl HeartbeatConfig {
    /// Silence after which the connection is treated as lost.
    #[must_use]
    pub fn deadline(&self) -> Duration { self.interval.saturating_add(self.timeout) }
}

/// Settings for a [`Session`](super::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for transport setup plus the DDP handshake.
    pub connect_timeout: Duration,
    /// Versions offered, most preferred first.
    pub protocol_versions: Vec<String>,
    /// Reconnect back-off.
    pub backoff: BackoffConfig,
    /// Client heartbeat; `None` disables it.
    pub heartbeat: Option<HeartbeatConfig>,
    /// Deadline applied to every method call.
    pub call_timeout: Option<Duration>,
    /// Transport tunables.
    pub transport: TransportConfig,
    /// Token replayed through `login` on every (re)connect.
    pub resume_token: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            protocol_versions: vec![SUPPORTED_VERSIONS[0].to_owned()],
            backoff: BackoffConfig::default(),
            heartbeat: Some(HeartbeatConfig::default()),
            call_timeout: None,
            transport: TransportConfig::default(),
            resume_token: None,
        }
    }
}

impl SessionConfig {
    /// Apply bounds: a non-empty version list, a normalised back-off and a
    /// clamped frame length.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.protocol_versions.retain(|version| !version.is_empty());
        if self.protocol_versions.is_empty() {
            self.protocol_versions = vec![SUPPORTED_VERSIONS[0].to_owned()];
        }
        let mut seen: Vec<String> = Vec::with_capacity(self.protocol_versions.len());
        self.protocol_versions.retain(|version| {
            if seen.contains(version) {
                return false;
            }
            seen.push(version.clone());
            true
        });
        self.backoff = self.backoff.normalized();
        self.transport.max_frame_length = clamp_frame_length(self.transport.max_frame_length);
        self.transport.max_message_size = self.transport.max_message_size.max(1);
        self.transport.outbox_capacity = self.transport.outbox_capacity.max(1);
        self.transport.handshake_timeout = self.transport.handshake_timeout.min(self.connect_timeout);
        self
    }

    /// Version advertised in the first `connect`.
    #[must_use]
    pub fn preferred_version(&self) -> &str {
        self.protocol_versions
            .first()
            .map_or(SUPPORTED_VERSIONS[0], String::as_str)
    }
}
