//! Routing of inbound DDP messages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    cache::CollectionStore,
    message::{DdpMessage, Inbound},
    metrics,
    registry::CallRegistry,
};

/// Applies inbound messages to the cache and the call registry.
///
/// Every message is handled to completion before the next one is read, so
/// cache mutations and call resolutions follow server order. Nothing here
/// returns an error: bad or unexpected input is logged and dropped.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    collections: Arc<CollectionStore>,
    registry: Arc<CallRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a session's cache and registry.
    #[must_use]
    pub fn new(collections: Arc<CollectionStore>, registry: Arc<CallRegistry>) -> Self {
        Self {
            collections,
            registry,
        }
    }

    /// Decode and apply one text frame, returning any reply to send.
    pub fn handle_text(&self, text: &str) -> Option<DdpMessage> {
        match Inbound::decode(text) {
            Ok(Inbound::Message(message)) => self.dispatch(message),
            Ok(Inbound::ServerId(id)) => {
                debug!(server_id = %id, "server greeting");
                None
            }
            Ok(Inbound::Unknown { kind, .. }) => {
                warn!(msg = %kind, "unknown message kind ignored");
                None
            }
            Err(err) => {
                warn!(error = %err, "malformed message dropped");
                metrics::inc_errors("wire");
                None
            }
        }
    }

    /// Apply one decoded message, returning any reply to send.
    pub fn dispatch(&self, message: DdpMessage) -> Option<DdpMessage> {
        match message {
            DdpMessage::Added {
                id,
                collection,
                fields,
            } => {
                self.collections
                    .get_or_create_temporary(&collection)
                    .added(&id, fields);
            }
            DdpMessage::AddedBefore {
                id,
                collection,
                fields,
                before,
            } => {
                self.collections
                    .get_or_create_temporary(&collection)
                    .added_before(&id, fields, before.as_deref());
            }
            DdpMessage::Changed {
                id,
                collection,
                fields,
                cleared,
            } => {
                self.collections
                    .get_or_create_temporary(&collection)
                    .changed(&id, fields.as_ref(), cleared.as_deref().unwrap_or_default());
            }
            DdpMessage::MovedBefore {
                id,
                collection,
                before,
            } => {
                self.collections
                    .get_or_create_temporary(&collection)
                    .moved_before(&id, before.as_deref());
            }
            DdpMessage::Removed { id, collection } => match self.collections.get(&collection) {
                Some(target) => {
                    target.removed(&id);
                }
                None => warn!(
                    collection = %collection,
                    doc_id = %id,
                    "remove for unknown collection ignored"
                ),
            },
            DdpMessage::Ready { subs } => {
                self.registry.mark_ready(&subs);
                if self.registry.pending_subscriptions() == 0 {
                    self.collections.set_all_ready(true);
                }
            }
            DdpMessage::Nosub { id, error } => self.registry.nosub(&id, error),
            DdpMessage::MethodResult { id, error, result } => {
                self.registry.resolve(&id, error, result);
            }
            DdpMessage::Updated { methods } => self.registry.mark_updated(&methods),
            DdpMessage::Ping { id } => return Some(DdpMessage::Pong { id }),
            DdpMessage::Pong { id } => debug!(id = ?id, "pong received"),
            DdpMessage::ServerError {
                reason,
                offending_message,
            } => {
                warn!(reason = %reason, offending = ?offending_message, "server reported an error");
                metrics::inc_errors("server");
            }
            other @ (DdpMessage::Connected { .. } | DdpMessage::Failed { .. }) => {
                warn!(msg = other.kind(), "handshake reply outside handshake ignored");
            }
            other @ (DdpMessage::Connect { .. }
            | DdpMessage::Sub { .. }
            | DdpMessage::Unsub { .. }
            | DdpMessage::Method { .. }) => {
                warn!(msg = other.kind(), "client message received from server ignored");
            }
        }
        None
    }
}
