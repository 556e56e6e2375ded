//! Bulk collection snapshots.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::Document;

/// Errors raised while loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The source could not provide the snapshot.
    #[error("snapshot fetch failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The snapshot is not valid JSON.
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The snapshot is not a JSON array.
    #[error("snapshot must be a JSON array of documents")]
    NotAnArray,
    /// An entry is not an object with a string `_id`.
    #[error("snapshot entry {index} is not a document with a string `_id`")]
    InvalidDocument {
        /// Position of the entry.
        index: usize,
    },
}

/// Provides the raw text of a collection snapshot, typically by HTTP.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the snapshot for `collection`.
    async fn fetch(&self, collection: &str) -> Result<String, SnapshotError>;
}

/// Outcome of a snapshot merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Documents that were new.
    pub added: usize,
    /// Documents that already existed and were merged.
    pub changed: usize,
}

/// Parse a snapshot: a JSON array of objects, each with a string `_id`.
///
/// # Errors
///
/// Returns [`SnapshotError`] for invalid JSON, a non-array body or an entry
/// without an id.
///
/// # Examples
///
/// ```
/// use ddpwire::cache::parse_snapshot;
///
/// let docs = parse_snapshot(r#"[{"_id":"a","n":1},{"_id":"b"}]"#).expect("valid snapshot");
/// assert_eq!(docs.len(), 2);
/// assert_eq!(docs[1].id(), "b");
/// ```
pub fn parse_snapshot(text: &str) -> Result<Vec<Document>, SnapshotError> {
    let Value::Array(entries) = serde_json::from_str(text)? else {
        return Err(SnapshotError::NotAnArray);
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            Document::from_value(entry).ok_or(SnapshotError::InvalidDocument { index })
        })
        .collect()
}
