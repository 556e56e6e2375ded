//! Subscription handles.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use super::CallRegistry;
use crate::message::{DdpMessage, MethodError};

/// Lifecycle of a subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionStatus {
    /// Sent; waiting for `ready`.
    Pending,
    /// Initial data has arrived.
    Ready,
    /// The server refused or ended the subscription with an error.
    Failed(MethodError),
    /// Stopped by the client, by a plain `nosub`, or by session close.
    Stopped,
}

impl SubscriptionStatus {
    /// Whether the subscription can no longer become ready.
    #[must_use]
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Failed(_) | Self::Stopped) }
}

/// Errors surfaced by [`Subscription::ready`].
#[derive(Debug, Error, PartialEq)]
pub enum SubscriptionError {
    /// The server sent `nosub` with an error.
    #[error("subscription failed: {0}")]
    Failed(MethodError),
    /// The subscription was stopped before becoming ready.
    #[error("subscription stopped")]
    Stopped,
    /// The session closed before the subscription became ready.
    #[error("session closed before subscription became ready")]
    SessionClosed,
}

#[derive(Debug)]
pub(crate) struct SubscriptionRecord {
    pub(crate) seq: u64,
    pub(crate) name: String,
    pub(crate) params: Vec<Value>,
    pub(crate) key: String,
    pub(crate) id: Mutex<String>,
    pub(crate) status: watch::Sender<SubscriptionStatus>,
}

impl SubscriptionRecord {
    pub(crate) fn new(seq: u64, id: String, name: &str, params: Vec<Value>) -> Self {
        let (status, _) = watch::channel(SubscriptionStatus::Pending);
        Self {
            seq,
            key: subscription_key(name, &params),
            name: name.to_owned(),
            params,
            id: Mutex::new(id),
            status,
        }
    }

    pub(crate) fn current_id(&self) -> String {
        self.id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_id(&self, id: String) {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }

    pub(crate) fn is_pending(&self) -> bool {
        *self.status.borrow() == SubscriptionStatus::Pending
    }

    pub(crate) fn sub_message(&self) -> DdpMessage {
        DdpMessage::Sub {
            id: self.current_id(),
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }
}

pub(crate) fn subscription_key(name: &str, params: &[Value]) -> String {
    format!("{name}\u{0}{}", Value::Array(params.to_vec()))
}

/// Handle to a publication subscription.
///
/// The same handle survives reconnects: its request id is replaced and its
/// status returns to [`SubscriptionStatus::Pending`] until the server sends a
/// fresh `ready`.
#[derive(Clone, Debug)]
pub struct Subscription {
    record: Arc<SubscriptionRecord>,
    registry: Weak<CallRegistry>,
}

impl Subscription {
    pub(crate) fn new(record: Arc<SubscriptionRecord>, registry: &Arc<CallRegistry>) -> Self {
        Self {
            record,
            registry: Arc::downgrade(registry),
        }
    }

    /// Current request id.
    #[must_use]
    pub fn id(&self) -> String { self.record.current_id() }

    /// Publication name.
    #[must_use]
    pub fn name(&self) -> &str { &self.record.name }

    /// Publication arguments.
    #[must_use]
    pub fn params(&self) -> &[Value] { &self.record.params }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SubscriptionStatus { self.record.status.borrow().clone() }

    /// Whether initial data has arrived on the current connection.
    #[must_use]
    pub fn is_ready(&self) -> bool { *self.record.status.borrow() == SubscriptionStatus::Ready }

    /// Watch status transitions.
    #[must_use]
    pub fn status_changes(&self) -> watch::Receiver<SubscriptionStatus> {
        self.record.status.subscribe()
    }

    /// Wait until the subscription is ready.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Failed`] when the server refuses the
    /// subscription, [`SubscriptionError::Stopped`] when it is stopped first
    /// and [`SubscriptionError::SessionClosed`] when the session goes away.
    pub async fn ready(&self) -> Result<(), SubscriptionError> {
        let mut rx = self.record.status.subscribe();
        let status = rx
            .wait_for(|status| *status != SubscriptionStatus::Pending)
            .await
            .map(|status| status.clone())
            .unwrap_or(SubscriptionStatus::Stopped);
        match status {
            SubscriptionStatus::Ready => Ok(()),
            SubscriptionStatus::Failed(error) => Err(SubscriptionError::Failed(error)),
            SubscriptionStatus::Pending | SubscriptionStatus::Stopped => {
                let closed = self
                    .registry
                    .upgrade()
                    .is_none_or(|registry| registry.is_closed());
                if closed {
                    Err(SubscriptionError::SessionClosed)
                } else {
                    Err(SubscriptionError::Stopped)
                }
            }
        }
    }

    /// Stop the subscription and send `unsub`.
    ///
    /// Returns `true` if this call stopped it; repeated calls are no-ops.
    pub fn stop(&self) -> bool {
        let mut stopped_now = false;
        self.record.status.send_if_modified(|status| {
            if status.is_terminal() {
                return false;
            }
            *status = SubscriptionStatus::Stopped;
            stopped_now = true;
            true
        });
        if stopped_now {
            let id = self.id();
            if let Some(registry) = self.registry.upgrade() {
                registry.subscriptions.remove(&id);
                registry.enqueue(DdpMessage::Unsub { id });
            }
        }
        stopped_now
    }
}
