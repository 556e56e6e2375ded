//! The set of collections owned by a session.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{Collection, CollectionKind};

/// All collections of one session, keyed by name.
#[derive(Debug, Default)]
pub struct CollectionStore {
    collections: DashMap<String, Arc<Collection>>,
}

impl CollectionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Declare `name`, creating it if needed.
    ///
    /// A collection previously auto-created for inbound data is kept, with
    /// its documents, and becomes declared.
    pub fn declare(&self, name: &str) -> Arc<Collection> {
        let collection = Arc::clone(
            self.collections
                .entry(name.to_owned())
                .or_insert_with(|| {
                    debug!(collection = name, "collection declared");
                    Arc::new(Collection::new(name, CollectionKind::Declared))
                })
                .value(),
        );
        collection.mark_declared();
        collection
    }

    /// Look up a collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up `name`, creating a temporary collection for unknown names.
    pub fn get_or_create_temporary(&self, name: &str) -> Arc<Collection> {
        if let Some(collection) = self.get(name) {
            return collection;
        }
        Arc::clone(
            self.collections
                .entry(name.to_owned())
                .or_insert_with(|| {
                    warn!(collection = name, "data for undeclared collection; creating it");
                    Arc::new(Collection::new(name, CollectionKind::Temporary))
                })
                .value(),
        )
    }

    /// Collection names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.collections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of collections.
    #[must_use]
    pub fn len(&self) -> usize { self.collections.len() }

    /// Whether no collection exists.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.collections.is_empty() }

    /// Set every collection's ready flag.
    pub(crate) fn set_all_ready(&self, ready: bool) {
        for entry in &self.collections {
            entry.set_ready(ready);
        }
    }
}
