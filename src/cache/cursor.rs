//! Lazy views over a collection.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{Collection, Document, ObserveCallbacks, ObserveHandle, Selector, observe};

/// A restartable, filtered view of a [`Collection`].
///
/// Nothing is captured at creation: each read walks the collection as it is
/// at that moment.
#[derive(Clone, Debug)]
pub struct Cursor {
    collection: Arc<Collection>,
    selector: Selector,
}

impl Cursor {
    pub(crate) fn new(collection: Arc<Collection>, selector: Selector) -> Self {
        Self {
            collection,
            selector,
        }
    }

    /// The collection this cursor reads.
    #[must_use]
    pub fn collection(&self) -> &Arc<Collection> { &self.collection }

    /// The selector.
    #[must_use]
    pub fn selector(&self) -> &Selector { &self.selector }

    /// Matching documents.
    ///
    /// Id-set selectors yield documents in the order the ids were given;
    /// every other selector yields collection order.
    #[must_use]
    pub fn fetch(&self) -> Vec<Document> {
        match &self.selector {
            Selector::Id(id) => self.collection.get(id).into_iter().collect(),
            Selector::Ids(ids) => ids.iter().filter_map(|id| self.collection.get(id)).collect(),
            selector => self
                .collection
                .documents()
                .into_iter()
                .filter(|doc| selector.matches(doc))
                .collect(),
        }
    }

    /// Matching documents decoded as `T`.
    ///
    /// # Errors
    ///
    /// Returns the first decode failure.
    pub fn fetch_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.fetch().iter().map(Document::deserialize).collect()
    }

    /// Number of matching documents.
    #[must_use]
    pub fn count(&self) -> usize { self.fetch().len() }

    /// First matching document.
    #[must_use]
    pub fn first(&self) -> Option<Document> { self.fetch().into_iter().next() }

    /// Watch matching documents.
    ///
    /// `added` is called for every current match before this returns; no
    /// mutation from another thread interleaves with that initial pass.
    /// Afterwards callbacks follow collection events filtered by the
    /// selector and the callbacks' fields of interest.
    pub fn observe(&self, callbacks: ObserveCallbacks) -> ObserveHandle {
        observe::start(self, callbacks)
    }
}
