//! Correlation of outgoing requests with inbound replies.
//!
//! The [`CallRegistry`] hands out request ids, keeps one entry per pending
//! method call and per active subscription, and resolves them as `result`,
//! `updated`, `ready` and `nosub` messages arrive. Unknown or repeated ids are
//! logged and ignored so a misbehaving server cannot break the dispatch loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tracing::{debug, error, warn};

use crate::message::{DdpMessage, MethodError};

mod method;
mod request_id;
mod subscription;

use method::CallState;
pub use method::{CallError, CallOutcome, MethodCall};
pub use request_id::RequestIdAllocator;
pub use subscription::{Subscription, SubscriptionError, SubscriptionStatus};
use subscription::{SubscriptionRecord, subscription_key};

/// Queue of messages waiting to be written by the session.
pub(crate) type Outbound = mpsc::UnboundedSender<DdpMessage>;

#[derive(Debug)]
struct PendingCall {
    state: watch::Sender<CallState>,
    deadline: Option<Instant>,
}

impl PendingCall {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

/// Pending method calls and active subscriptions for one session.
#[derive(Debug)]
pub struct CallRegistry {
    ids: RequestIdAllocator,
    calls: DashMap<String, PendingCall>,
    subscriptions: DashMap<String, Arc<SubscriptionRecord>>,
    call_timeout: Option<Duration>,
    outbound: Outbound,
    closed: AtomicBool,
}

impl CallRegistry {
    pub(crate) fn new(outbound: Outbound, call_timeout: Option<Duration>) -> Self {
        Self {
            ids: RequestIdAllocator::default(),
            calls: DashMap::new(),
            subscriptions: DashMap::new(),
            call_timeout,
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    /// The shared request id allocator.
    #[must_use]
    pub fn ids(&self) -> &RequestIdAllocator { &self.ids }

    pub(crate) fn enqueue(&self, message: DdpMessage) {
        if let Err(err) = self.outbound.send(message) {
            debug!(msg = err.0.kind(), "session closed; outbound message dropped");
        }
    }

    /// Register a method call and return its handle plus the `method`
    /// message to send.
    ///
    /// Calls whose deadline has already passed are dropped first.
    pub fn register_method(
        self: &Arc<Self>,
        name: &str,
        params: Vec<Value>,
    ) -> (MethodCall, DdpMessage) {
        let now = Instant::now();
        if self.call_timeout.is_some() {
            self.expire_calls(now);
        }
        let id = self.ids.next_id(name);
        let (state, rx) = watch::channel(CallState::default());
        let deadline = self.call_timeout.map(|limit| now + limit);
        self.calls.insert(id.clone(), PendingCall { state, deadline });
        let call = MethodCall::new(
            id.clone(),
            name.to_owned(),
            rx,
            deadline,
            Arc::downgrade(self),
        );
        let message = DdpMessage::Method {
            id,
            method: name.to_owned(),
            params,
        };
        (call, message)
    }

    /// Deliver a `result` for `id`.
    ///
    /// Returns `true` if this delivery completed the call. Duplicates and
    /// unknown ids are logged and return `false`.
    pub fn resolve(&self, id: &str, error: Option<MethodError>, result: Option<Value>) -> bool {
        let Some(entry) = self.calls.get(id) else {
            error!(request_id = id, "result for unknown method call");
            return false;
        };
        let mut fired = false;
        entry.state.send_if_modified(|state| {
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(CallOutcome { error, result });
            fired = true;
            true
        });
        let finished = entry.state.borrow().updated;
        drop(entry);

        if !fired {
            warn!(request_id = id, "duplicate result ignored");
            return false;
        }
        if finished {
            self.calls.remove(id);
        }
        true
    }

    /// Deliver `updated` for each id in `ids`.
    pub fn mark_updated(&self, ids: &[String]) {
        for id in ids {
            let Some(entry) = self.calls.get(id) else {
                error!(request_id = %id, "updated for unknown method call");
                continue;
            };
            let changed = entry
                .state
                .send_if_modified(|state| !std::mem::replace(&mut state.updated, true));
            let finished = entry.state.borrow().outcome.is_some();
            drop(entry);
            if !changed {
                warn!(request_id = %id, "duplicate updated ignored");
            }
            if finished {
                self.calls.remove(id);
            }
        }
    }

    /// Drop every call whose deadline is at or before `now`.
    ///
    /// Their handles already report [`CallError::Timeout`]; a late `result`
    /// is logged as unknown. Returns the number of calls dropped.
    pub fn expire_calls(&self, now: Instant) -> usize {
        let mut expired = 0;
        self.calls.retain(|id, call| {
            if !call.is_expired(now) {
                return true;
            }
            debug!(request_id = %id, "method call expired");
            expired += 1;
            false
        });
        expired
    }

    pub(crate) fn forget_call(&self, id: &str) {
        if self.calls.remove(id).is_some() {
            debug!(request_id = id, "method call expired");
        }
    }

    /// Settle calls answered on a connection that has since dropped.
    ///
    /// A server sends `updated` only on the connection that ran the method,
    /// so a call holding a result is marked updated and dropped. Calls still
    /// waiting for their result stay registered. Returns the number settled.
    pub fn settle_answered(&self) -> usize {
        let mut settled = 0;
        self.calls.retain(|id, call| {
            if call.state.borrow().outcome.is_none() {
                return true;
            }
            call.state.send_modify(|state| state.updated = true);
            debug!(request_id = %id, "updated signal settled after reconnect");
            settled += 1;
            false
        });
        settled
    }

    /// Register a subscription.
    ///
    /// A pending subscription with the same name and parameters is reused,
    /// in which case no `sub` message is returned.
    pub fn register_subscription(
        self: &Arc<Self>,
        name: &str,
        params: Vec<Value>,
    ) -> (Subscription, Option<DdpMessage>) {
        let key = subscription_key(name, &params);
        let existing = self
            .subscriptions
            .iter()
            .find(|entry| entry.key == key && entry.is_pending())
            .map(|entry| Arc::clone(entry.value()));
        if let Some(record) = existing {
            debug!(
                subscription = name,
                request_id = %record.current_id(),
                "reusing pending subscription"
            );
            return (Subscription::new(record, self), None);
        }

        let id = self.ids.next_id(name);
        let record = Arc::new(SubscriptionRecord::new(
            self.ids.issued(),
            id.clone(),
            name,
            params,
        ));
        self.subscriptions.insert(id, Arc::clone(&record));
        let message = record.sub_message();
        (Subscription::new(record, self), Some(message))
    }

    /// Mark each subscription in `ids` ready.
    pub fn mark_ready(&self, ids: &[String]) {
        for id in ids {
            let Some(record) = self.subscriptions.get(id).map(|entry| Arc::clone(entry.value()))
            else {
                error!(request_id = %id, "ready for unknown subscription");
                continue;
            };
            let changed = record.status.send_if_modified(|status| {
                if *status == SubscriptionStatus::Pending {
                    *status = SubscriptionStatus::Ready;
                    true
                } else {
                    false
                }
            });
            if !changed {
                debug!(request_id = %id, "ready ignored for non-pending subscription");
            }
        }
    }

    /// Handle `nosub` for `id`.
    pub fn nosub(&self, id: &str, error: Option<MethodError>) {
        let Some((_, record)) = self.subscriptions.remove(id) else {
            debug!(request_id = id, "nosub for inactive subscription");
            return;
        };
        match error {
            Some(error) => {
                warn!(request_id = id, subscription = %record.name, error = %error, "subscription failed");
                record.status.send_replace(SubscriptionStatus::Failed(error));
            }
            None => {
                debug!(request_id = id, subscription = %record.name, "subscription ended by server");
                record.status.send_replace(SubscriptionStatus::Stopped);
            }
        }
    }

    /// Reissue every active subscription under a fresh id.
    ///
    /// Each subscription returns to pending; the returned `sub` messages are
    /// in original subscription order.
    pub fn resubscribe_all(&self) -> Vec<DdpMessage> {
        let mut records: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        records.sort_by_key(|record| record.seq);

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            let old_id = record.current_id();
            if self.subscriptions.remove(&old_id).is_none() {
                continue;
            }
            let new_id = self.ids.next_id(&record.name);
            record.set_id(new_id.clone());
            record.status.send_replace(SubscriptionStatus::Pending);
            debug!(
                subscription = %record.name,
                old_id = %old_id,
                request_id = %new_id,
                "resubscribing"
            );
            messages.push(record.sub_message());
            self.subscriptions.insert(new_id, record);
        }
        messages
    }

    /// Fail every pending call and stop every subscription.
    ///
    /// The registry is closed afterwards.
    pub fn abandon_all(&self) {
        self.closed.store(true, Ordering::Release);
        for entry in &self.calls {
            entry.state.send_modify(|state| state.abandoned = true);
        }
        self.calls.clear();
        for entry in &self.subscriptions {
            entry.status.send_replace(SubscriptionStatus::Stopped);
        }
        self.subscriptions.clear();
    }

    /// Whether [`CallRegistry::abandon_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Number of calls still waiting for a result or updated signal.
    #[must_use]
    pub fn pending_calls(&self) -> usize { self.calls.len() }

    /// Whether `id` is the current id of an active subscription.
    #[must_use]
    pub fn has_subscription(&self, id: &str) -> bool { self.subscriptions.contains_key(id) }

    /// Number of active subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize { self.subscriptions.len() }

    /// Number of subscriptions still waiting for `ready`.
    #[must_use]
    pub fn pending_subscriptions(&self) -> usize {
        self.subscriptions
            .iter()
            .filter(|entry| entry.is_pending())
            .count()
    }
}

#[cfg(test)]
mod tests;
