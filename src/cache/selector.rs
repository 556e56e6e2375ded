//! Document selectors.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use super::{Document, document::ID_FIELD};

type Predicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Chooses which documents a [`Cursor`](super::Cursor) yields.
#[derive(Clone, Default)]
pub enum Selector {
    /// Every document.
    #[default]
    All,
    /// One document by id.
    Id(String),
    /// A set of ids. Cursors yield them in the order given.
    Ids(Vec<String>),
    /// Documents whose named fields equal the given values. `_id` matches
    /// the document id.
    Fields(Map<String, Value>),
    /// Documents accepted by a predicate.
    Predicate(Predicate),
}

impl Selector {
    /// Selector backed by a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Whether `doc` is selected.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => doc.id() == id,
            Self::Ids(ids) => ids.iter().any(|id| id == doc.id()),
            Self::Fields(expected) => expected.iter().all(|(name, value)| {
                if name == ID_FIELD {
                    value.as_str() == Some(doc.id())
                } else {
                    doc.get(name) == Some(value)
                }
            }),
            Self::Predicate(f) => f(doc),
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self { Self::Id(id.to_owned()) }
}

impl From<String> for Selector {
    fn from(id: String) -> Self { Self::Id(id) }
}

impl From<Vec<String>> for Selector {
    fn from(ids: Vec<String>) -> Self { Self::Ids(ids) }
}

impl From<Map<String, Value>> for Selector {
    fn from(fields: Map<String, Value>) -> Self { Self::Fields(fields) }
}
