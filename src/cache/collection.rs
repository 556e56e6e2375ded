//! Ordered, id-keyed document collections.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        RwLock,
        RwLockReadGuard,
        RwLockWriteGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use indexmap::IndexMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    Cursor,
    Document,
    Selector,
    event::{CollectionEvent, CollectionObserver, ObserverId},
    snapshot::SnapshotStats,
};

/// How a collection came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    /// Declared by the application.
    Declared,
    /// Created on demand for inbound data addressed to an unknown name.
    Temporary,
}

type Observers = Vec<(ObserverId, Arc<dyn CollectionObserver>)>;

/// Client-side mirror of one server collection.
///
/// Documents keep server order. Mutations are serialised by a re-entrant
/// gate; readers use a separate lock that is never held while events are
/// delivered.
pub struct Collection {
    name: String,
    declared: AtomicBool,
    ready: AtomicBool,
    docs: RwLock<IndexMap<String, Document>>,
    gate: ReentrantMutex<()>,
    observers: Mutex<Observers>,
    next_observer: AtomicU64,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("ready", &self.is_ready())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Create an empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            declared: AtomicBool::new(kind == CollectionKind::Declared),
            ready: AtomicBool::new(false),
            docs: RwLock::new(IndexMap::new()),
            gate: ReentrantMutex::new(()),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Whether the application declared this collection.
    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        if self.declared.load(Ordering::Acquire) {
            CollectionKind::Declared
        } else {
            CollectionKind::Temporary
        }
    }

    pub(crate) fn mark_declared(&self) { self.declared.store(true, Ordering::Release); }

    /// Whether a subscription has delivered its initial data on the current
    /// connection.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.ready.load(Ordering::Acquire) }

    pub(crate) fn set_ready(&self, ready: bool) { self.ready.store(ready, Ordering::Release); }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Document>> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Document>> {
        self.docs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize { self.read().len() }

    /// Whether the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.read().is_empty() }

    /// Whether a document with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool { self.read().contains_key(id) }

    /// Copy of one document.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> { self.read().get(id).cloned() }

    /// Position of `id` in collection order.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> { self.read().get_index_of(id) }

    /// Document ids in collection order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> { self.read().keys().cloned().collect() }

    /// Copies of every document in collection order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> { self.read().values().cloned().collect() }

    /// Lazy view over the documents matching `selector`.
    pub fn find(self: &Arc<Self>, selector: impl Into<Selector>) -> Cursor {
        Cursor::new(Arc::clone(self), selector.into())
    }

    /// Attach an observer to every future event.
    pub fn subscribe_events(&self, observer: Arc<dyn CollectionObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Detach an observer. Returns `false` if it was not attached.
    pub fn unsubscribe_events(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Block other threads from mutating until the guard drops.
    pub(crate) fn lock_mutations(&self) -> ReentrantMutexGuard<'_, ()> { self.gate.lock() }

    fn observers(&self) -> Vec<Arc<dyn CollectionObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn emit(observers: &[Arc<dyn CollectionObserver>], event: &CollectionEvent<'_>) {
        for observer in observers {
            observer.on_event(event);
        }
    }

    /// Apply `added`. Returns `false` when the id already exists.
    pub fn added(&self, id: &str, fields: Map<String, Value>) -> bool {
        self.insert(id, fields, None)
    }

    /// Apply `addedBefore`. A missing or unknown `before` appends.
    pub fn added_before(&self, id: &str, fields: Map<String, Value>, before: Option<&str>) -> bool {
        self.insert(id, fields, before)
    }

    fn insert(&self, id: &str, fields: Map<String, Value>, before: Option<&str>) -> bool {
        let _gate = self.gate.lock();
        if self.contains(id) {
            debug!(collection = %self.name, doc_id = id, "duplicate add ignored");
            return false;
        }
        let doc = Document::new(id, fields);
        let observers = self.observers();
        Self::emit(&observers, &CollectionEvent::WillAdd { doc: &doc });

        let index = {
            let mut docs = self.write();
            match before.and_then(|target| docs.get_index_of(target)) {
                Some(at) => {
                    docs.shift_insert(at, id.to_owned(), doc.clone());
                    at
                }
                None => {
                    if let Some(target) = before {
                        warn!(
                            collection = %self.name,
                            doc_id = id,
                            before = target,
                            "insert position refers to unknown document; appending"
                        );
                    }
                    docs.insert(id.to_owned(), doc.clone());
                    docs.len() - 1
                }
            }
        };
        Self::emit(&observers, &CollectionEvent::DidAdd { doc: &doc, index });
        true
    }

    /// Apply `changed`: merge `fields` and drop every name in `cleared`.
    ///
    /// An unknown id is inserted with the given fields and logged.
    pub fn changed(&self, id: &str, fields: Option<&Map<String, Value>>, cleared: &[String]) {
        let _gate = self.gate.lock();
        let Some(before) = self.get(id) else {
            warn!(
                collection = %self.name,
                doc_id = id,
                "change for unknown document; inserting"
            );
            let mut fields = fields.cloned().unwrap_or_default();
            for name in cleared {
                fields.shift_remove(name);
            }
            self.insert(id, fields, None);
            return;
        };
        let observers = self.observers();
        Self::emit(
            &observers,
            &CollectionEvent::WillChange {
                doc: &before,
                fields,
                cleared,
            },
        );

        let mut after = before.clone();
        after.apply(fields, cleared);
        if let Some(slot) = self.write().get_mut(id) {
            *slot = after.clone();
        }
        Self::emit(
            &observers,
            &CollectionEvent::DidChange {
                before: &before,
                after: &after,
                fields,
                cleared,
            },
        );
    }

    /// Apply `removed`. Returns `false` when the id is unknown.
    pub fn removed(&self, id: &str) -> bool {
        let _gate = self.gate.lock();
        let Some(doc) = self.get(id) else {
            debug!(collection = %self.name, doc_id = id, "remove for unknown document ignored");
            return false;
        };
        let observers = self.observers();
        Self::emit(&observers, &CollectionEvent::WillRemove { doc: &doc });
        self.write().shift_remove(id);
        Self::emit(&observers, &CollectionEvent::DidRemove { doc: &doc });
        true
    }

    /// Apply `movedBefore`: place `id` immediately before `before`, or last
    /// when `before` is `None`.
    ///
    /// Membership and size never change. Returns `false` when nothing moved.
    pub fn moved_before(&self, id: &str, before: Option<&str>) -> bool {
        let _gate = self.gate.lock();
        let (doc, from, to) = {
            let mut docs = self.write();
            let Some(from) = docs.get_index_of(id) else {
                warn!(collection = %self.name, doc_id = id, "move for unknown document ignored");
                return false;
            };
            let last = docs.len() - 1;
            let to = match before {
                None => last,
                Some(target) => match docs.get_index_of(target) {
                    Some(at) if at > from => at - 1,
                    Some(at) => at,
                    None => {
                        warn!(
                            collection = %self.name,
                            doc_id = id,
                            before = target,
                            "move target is unknown; moving to end"
                        );
                        last
                    }
                },
            };
            if from == to {
                return false;
            }
            docs.move_index(from, to);
            (docs[to].clone(), from, to)
        };
        let observers = self.observers();
        Self::emit(&observers, &CollectionEvent::DidMove { doc: &doc, from, to });
        true
    }

    /// Merge a bulk snapshot: known ids are changed, new ids are added.
    pub fn merge_snapshot(&self, docs: Vec<Document>) -> SnapshotStats {
        let _gate = self.gate.lock();
        let mut stats = SnapshotStats::default();
        for doc in docs {
            if self.contains(doc.id()) {
                self.changed(doc.id(), Some(doc.fields()), &[]);
                stats.changed += 1;
            } else {
                let (id, fields) = doc.into_parts();
                self.insert(&id, fields, None);
                stats.added += 1;
            }
        }
        debug!(
            collection = %self.name,
            added = stats.added,
            changed = stats.changed,
            "snapshot merged"
        );
        stats
    }
}
