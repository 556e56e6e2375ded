//! Local document cache.
//!
//! A [`CollectionStore`] holds one [`Collection`] per server collection.
//! Collections apply `added`, `changed`, `removed` and `movedBefore`
//! messages in arrival order and raise [`CollectionEvent`]s around each
//! mutation. [`Cursor`]s read a collection lazily through a [`Selector`],
//! and [`Cursor::observe`] turns those events into per-document callbacks.

mod collection;
mod cursor;
mod document;
mod event;
mod observe;
mod selector;
mod snapshot;
mod store;

pub use collection::{Collection, CollectionKind};
pub use cursor::Cursor;
pub use document::{Document, ID_FIELD};
pub use event::{CollectionEvent, CollectionObserver, ObserverId};
pub use observe::{ObserveCallbacks, ObserveHandle};
pub use selector::Selector;
pub use snapshot::{SnapshotError, SnapshotSource, SnapshotStats, parse_snapshot};
pub use store::CollectionStore;

#[cfg(test)]
mod tests;
