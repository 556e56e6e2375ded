//! Method call handles.

use std::sync::Weak;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{Instant, timeout_at},
};
use tracing::warn;

use super::CallRegistry;
use crate::message::MethodError;

/// The server's answer to a method call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOutcome {
    /// Error thrown by the method, if any.
    pub error: Option<MethodError>,
    /// Raw return value, if any.
    pub result: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CallState {
    pub(crate) outcome: Option<CallOutcome>,
    pub(crate) updated: bool,
    pub(crate) abandoned: bool,
}

impl CallState {
    fn has_outcome(&self) -> bool { self.outcome.is_some() }

    fn is_updated(&self) -> bool { self.updated }
}

/// Errors surfaced through a [`MethodCall`].
#[derive(Debug, Error)]
pub enum CallError {
    /// The method threw.
    #[error(transparent)]
    Method(#[from] MethodError),
    /// The result could not be converted to the requested type.
    #[error("cannot decode result of `{method}`: {source}")]
    Coercion {
        /// Method name.
        method: String,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// The call deadline elapsed first.
    #[error("method call `{id}` timed out")]
    Timeout {
        /// Request id.
        id: String,
    },
    /// The session closed before the call completed.
    #[error("session closed before method call `{id}` completed")]
    SessionClosed {
        /// Request id.
        id: String,
    },
}

/// Handle to an in-flight method call.
///
/// Completion has two independent signals: the `result` message carrying
/// the return value, and the `updated` message confirming the call's writes
/// are visible. Each fires at most once. Awaiting either is a suspension
/// point; the handle can be awaited any number of times and cloned freely.
#[derive(Clone, Debug)]
pub struct MethodCall {
    id: String,
    method: String,
    state: watch::Receiver<CallState>,
    deadline: Option<Instant>,
    registry: Weak<CallRegistry>,
}

impl MethodCall {
    pub(crate) fn new(
        id: String,
        method: String,
        state: watch::Receiver<CallState>,
        deadline: Option<Instant>,
        registry: Weak<CallRegistry>,
    ) -> Self {
        Self {
            id,
            method,
            state,
            deadline,
            registry,
        }
    }

    /// Request id used on the wire.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Whether the result has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.state.borrow().has_outcome() }

    /// Whether the updated signal has arrived.
    #[must_use]
    pub fn is_updated(&self) -> bool { self.state.borrow().updated }

    /// Wait for the raw outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Timeout`] or [`CallError::SessionClosed`] if no
    /// result arrives.
    pub async fn outcome(&self) -> Result<CallOutcome, CallError> {
        let state = self.wait_until(CallState::has_outcome).await?;
        Ok(state.outcome.unwrap_or_default())
    }

    /// Wait for the result value. A method returning nothing yields `null`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Method`] when the method threw, plus the waiting
    /// errors of [`MethodCall::outcome`].
    pub async fn result(&self) -> Result<Value, CallError> {
        let outcome = self.outcome().await?;
        match outcome.error {
            Some(error) => Err(CallError::Method(error)),
            None => Ok(outcome.result.unwrap_or(Value::Null)),
        }
    }

    /// Wait for the result and decode it as `T`.
    ///
    /// When the server reported an error, that error wins and a decode
    /// failure is only logged. Otherwise a decode failure is returned as
    /// [`CallError::Coercion`].
    ///
    /// # Errors
    ///
    /// See above, plus the waiting errors of [`MethodCall::outcome`].
    pub async fn result_as<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        let outcome = self.outcome().await?;
        let raw = outcome.result.unwrap_or(Value::Null);
        let decoded = serde_json::from_value::<T>(raw);
        match (outcome.error, decoded) {
            (Some(error), Ok(_)) => Err(CallError::Method(error)),
            (Some(error), Err(source)) => {
                warn!(
                    request_id = %self.id,
                    method = %self.method,
                    error = %source,
                    "method result does not match the requested type"
                );
                Err(CallError::Method(error))
            }
            (None, Ok(value)) => Ok(value),
            (None, Err(source)) => Err(CallError::Coercion {
                method: self.method.clone(),
                source,
            }),
        }
    }

    /// Wait for the updated signal.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Timeout`] or [`CallError::SessionClosed`].
    pub async fn updated(&self) -> Result<(), CallError> {
        self.wait_until(CallState::is_updated).await.map(|_| ())
    }

    /// Wait until both the result and the updated signal have arrived.
    ///
    /// # Errors
    ///
    /// As for [`MethodCall::result`] and [`MethodCall::updated`].
    pub async fn durable(&self) -> Result<Value, CallError> {
        let value = self.result().await?;
        self.updated().await?;
        Ok(value)
    }

    async fn wait_until(&self, ready: fn(&CallState) -> bool) -> Result<CallState, CallError> {
        let mut rx = self.state.clone();
        let wait = async move {
            rx.wait_for(|state| state.abandoned || ready(state))
                .await
                .map(|state| state.clone())
        };
        let waited = match self.deadline {
            Some(deadline) => {
                let Ok(waited) = timeout_at(deadline, wait).await else {
                    if let Some(registry) = self.registry.upgrade() {
                        registry.forget_call(&self.id);
                    }
                    return Err(self.timeout());
                };
                waited
            }
            None => wait.await,
        };
        match waited {
            Ok(state) if ready(&state) => Ok(state),
            // The entry was dropped at its deadline by another waiter.
            Err(_) if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) => {
                Err(self.timeout())
            }
            _ => Err(self.closed()),
        }
    }

    fn timeout(&self) -> CallError {
        CallError::Timeout {
            id: self.id.clone(),
        }
    }

    fn closed(&self) -> CallError {
        CallError::SessionClosed {
            id: self.id.clone(),
        }
    }
}
