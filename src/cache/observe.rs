//! Live observation of a cursor.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::{Map, Value};

use super::{
    Collection,
    Cursor,
    Document,
    Selector,
    event::{CollectionEvent, CollectionObserver, ObserverId},
};

type DocCallback = Box<dyn Fn(&Document) + Send + Sync>;
type ChangeCallback = Box<dyn Fn(&Document, &Document) + Send + Sync>;

/// Callbacks invoked by [`Cursor::observe`].
///
/// # Examples
///
/// ```
/// use ddpwire::cache::ObserveCallbacks;
///
/// let callbacks = ObserveCallbacks::new()
///     .on_added(|doc| println!("added {}", doc.id()))
///     .on_changed(|new, _old| println!("changed {}", new.id()))
///     .fields(["title"]);
/// # drop(callbacks);
/// ```
#[derive(Default)]
pub struct ObserveCallbacks {
    added: Option<DocCallback>,
    changed: Option<ChangeCallback>,
    removed: Option<DocCallback>,
    fields: Option<HashSet<String>>,
}

impl fmt::Debug for ObserveCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveCallbacks")
            .field("added", &self.added.is_some())
            .field("changed", &self.changed.is_some())
            .field("removed", &self.removed.is_some())
            .field("fields", &self.fields)
            .finish()
    }
}

impl ObserveCallbacks {
    /// No callbacks, every field of interest.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Called when a document starts matching.
    #[must_use]
    pub fn on_added(mut self, f: impl Fn(&Document) + Send + Sync + 'static) -> Self {
        self.added = Some(Box::new(f));
        self
    }

    /// Called with `(new, old)` when a matching document changes.
    #[must_use]
    pub fn on_changed(mut self, f: impl Fn(&Document, &Document) + Send + Sync + 'static) -> Self {
        self.changed = Some(Box::new(f));
        self
    }

    /// Called when a document stops matching.
    #[must_use]
    pub fn on_removed(mut self, f: impl Fn(&Document) + Send + Sync + 'static) -> Self {
        self.removed = Some(Box::new(f));
        self
    }

    /// Only report changes touching one of `fields`.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn interested(&self, fields: Option<&Map<String, Value>>, cleared: &[String]) -> bool {
        let Some(wanted) = &self.fields else {
            return true;
        };
        fields.is_some_and(|set| set.keys().any(|name| wanted.contains(name)))
            || cleared.iter().any(|name| wanted.contains(name))
    }

    fn added(&self, doc: &Document) {
        if let Some(f) = &self.added {
            f(doc);
        }
    }

    fn removed(&self, doc: &Document) {
        if let Some(f) = &self.removed {
            f(doc);
        }
    }

    fn changed(&self, new: &Document, old: &Document) {
        if let Some(f) = &self.changed {
            f(new, old);
        }
    }
}

struct Observation {
    selector: Selector,
    callbacks: ObserveCallbacks,
    initializing: AtomicBool,
    stopped: AtomicBool,
}

impl Observation {
    fn is_live(&self) -> bool {
        !self.initializing.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }
}

impl CollectionObserver for Observation {
    fn on_event(&self, event: &CollectionEvent<'_>) {
        if !self.is_live() {
            return;
        }
        match *event {
            CollectionEvent::DidAdd { doc, .. } => {
                if self.selector.matches(doc) {
                    self.callbacks.added(doc);
                }
            }
            CollectionEvent::DidChange {
                before,
                after,
                fields,
                cleared,
            } => match (self.selector.matches(before), self.selector.matches(after)) {
                (false, true) => self.callbacks.added(after),
                (true, false) => self.callbacks.removed(before),
                (true, true) if self.callbacks.interested(fields, cleared) => {
                    self.callbacks.changed(after, before);
                }
                _ => {}
            },
            CollectionEvent::DidRemove { doc } => {
                if self.selector.matches(doc) {
                    self.callbacks.removed(doc);
                }
            }
            CollectionEvent::WillAdd { .. }
            | CollectionEvent::WillChange { .. }
            | CollectionEvent::WillRemove { .. }
            | CollectionEvent::DidMove { .. } => {}
        }
    }
}

pub(super) fn start(cursor: &Cursor, callbacks: ObserveCallbacks) -> ObserveHandle {
    let collection = cursor.collection();
    let observation = Arc::new(Observation {
        selector: cursor.selector().clone(),
        callbacks,
        initializing: AtomicBool::new(true),
        stopped: AtomicBool::new(false),
    });

    let gate = collection.lock_mutations();
    let observer = collection.subscribe_events(Arc::clone(&observation) as Arc<dyn CollectionObserver>);
    for doc in cursor.fetch() {
        observation.callbacks.added(&doc);
    }
    observation.initializing.store(false, Ordering::Release);
    drop(gate);

    ObserveHandle {
        collection: Arc::downgrade(collection),
        observer,
        observation,
    }
}

/// Keeps an observation alive. Dropping the handle stops it.
pub struct ObserveHandle {
    collection: Weak<Collection>,
    observer: ObserverId,
    observation: Arc<Observation>,
}

impl fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("observer", &self.observer)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ObserveHandle {
    /// Detach from the collection. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        if self.observation.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(collection) = self.collection.upgrade() {
            collection.unsubscribe_events(self.observer);
        }
        true
    }

    /// Whether [`ObserveHandle::stop`] has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.observation.stopped.load(Ordering::Acquire) }
}

impl Drop for ObserveHandle {
    fn drop(&mut self) { self.stop(); }
}
