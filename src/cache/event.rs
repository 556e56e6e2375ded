//! Mutation events raised by a [`Collection`](super::Collection).

use serde_json::{Map, Value};

use super::Document;

/// One step of a collection mutation.
///
/// `Will*` events fire before the mutation is applied, `Did*` events after.
/// Events are delivered synchronously on the mutating thread with no cache
/// lock held, so observers may read the collection.
#[derive(Clone, Copy, Debug)]
pub enum CollectionEvent<'a> {
    /// A document is about to be inserted.
    WillAdd {
        /// The document as it will be stored.
        doc: &'a Document,
    },
    /// A document was inserted.
    DidAdd {
        /// The stored document.
        doc: &'a Document,
        /// Its position in collection order.
        index: usize,
    },
    /// A document is about to change.
    WillChange {
        /// The current document.
        doc: &'a Document,
        /// Fields being set.
        fields: Option<&'a Map<String, Value>>,
        /// Fields being cleared.
        cleared: &'a [String],
    },
    /// A document changed.
    DidChange {
        /// The document before the change.
        before: &'a Document,
        /// The document after the change.
        after: &'a Document,
        /// Fields that were set.
        fields: Option<&'a Map<String, Value>>,
        /// Fields that were cleared.
        cleared: &'a [String],
    },
    /// A document is about to be removed.
    WillRemove {
        /// The document being removed.
        doc: &'a Document,
    },
    /// A document was removed.
    DidRemove {
        /// The removed document.
        doc: &'a Document,
    },
    /// A document moved within collection order.
    DidMove {
        /// The moved document.
        doc: &'a Document,
        /// Previous position.
        from: usize,
        /// New position.
        to: usize,
    },
}

impl CollectionEvent<'_> {
    /// Id of the document the event concerns.
    #[must_use]
    pub fn doc_id(&self) -> &str {
        match self {
            Self::WillAdd { doc }
            | Self::DidAdd { doc, .. }
            | Self::WillChange { doc, .. }
            | Self::WillRemove { doc }
            | Self::DidRemove { doc }
            | Self::DidMove { doc, .. } => doc.id(),
            Self::DidChange { after, .. } => after.id(),
        }
    }
}

/// Receives every event of one collection.
pub trait CollectionObserver: Send + Sync {
    /// Handle an event.
    fn on_event(&self, event: &CollectionEvent<'_>);
}

impl<F> CollectionObserver for F
where
    F: Fn(&CollectionEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &CollectionEvent<'_>) { self(event); }
}

/// Identifies a registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);
