//! Unit tests for the document cache.

use std::sync::{Arc, Mutex, PoisonError};

use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::*;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn record_events(collection: &Collection) -> Journal {
    let journal = Journal::default();
    let sink = journal.clone();
    collection.subscribe_events(Arc::new(move |event: &CollectionEvent<'_>| {
        let name = match event {
            CollectionEvent::WillAdd { .. } => "will-add",
            CollectionEvent::DidAdd { .. } => "did-add",
            CollectionEvent::WillChange { .. } => "will-change",
            CollectionEvent::DidChange { .. } => "did-change",
            CollectionEvent::WillRemove { .. } => "will-remove",
            CollectionEvent::DidRemove { .. } => "did-remove",
            CollectionEvent::DidMove { .. } => "did-move",
        };
        sink.push(format!("{name}:{}", event.doc_id()));
    }));
    journal
}

fn record_observe(journal: &Journal) -> ObserveCallbacks {
    let added = journal.clone();
    let changed = journal.clone();
    let removed = journal.clone();
    ObserveCallbacks::new()
        .on_added(move |doc| added.push(format!("added:{}", doc.id())))
        .on_changed(move |new, _| changed.push(format!("changed:{}", new.id())))
        .on_removed(move |doc| removed.push(format!("removed:{}", doc.id())))
}

#[fixture]
fn todos() -> Arc<Collection> {
    // declared, empty collection
    Arc::new(Collection::new("todos", CollectionKind::Declared))
}

fn ids(collection: &Collection) -> Vec<String> { collection.ids() }

#[rstest]
fn added_is_idempotent(todos: Arc<Collection>) {
    let journal = record_events(&todos);
    assert!(todos.added("t1", fields(json!({"title": "x"}))));
    assert!(!todos.added("t1", fields(json!({"title": "y"}))));

    assert_eq!(todos.len(), 1);
    assert_eq!(todos.get("t1").expect("doc").get("title"), Some(&json!("x")));
    assert_eq!(journal.entries(), vec!["will-add:t1", "did-add:t1"]);
}

#[rstest]
fn changed_merges_and_clears(todos: Arc<Collection>) {
    todos.added("a", fields(json!({"a": 1, "b": 2})));
    let journal = record_events(&todos);
    todos.changed("a", Some(&fields(json!({"a": 5}))), &["b".to_owned()]);

    let doc = todos.get("a").expect("doc");
    assert_eq!(doc.fields(), &fields(json!({"a": 5})));
    assert_eq!(journal.entries(), vec!["will-change:a", "did-change:a"]);
}

#[rstest]
fn id_cannot_be_patched(todos: Arc<Collection>) {
    todos.added("a", fields(json!({"_id": "zzz", "n": 1})));
    todos.changed("a", Some(&fields(json!({"_id": "b"}))), &[]);
    let doc = todos.get("a").expect("doc");
    assert_eq!(doc.id(), "a");
    assert_eq!(doc.to_value(), json!({"_id": "a", "n": 1}));
}

#[test]
fn stripping_the_id_keeps_field_order() {
    let raw = json!({"_id": "a", "title": "x", "done": false, "rank": 3});
    let from_new = Document::new("a", fields(raw.clone()));
    let from_value = Document::from_value(raw).expect("document");
    for doc in [from_new, from_value] {
        let names: Vec<_> = doc.fields().keys().map(String::as_str).collect();
        assert_eq!(names, ["title", "done", "rank"]);
    }
}

#[rstest]
fn changed_on_unknown_id_upserts(todos: Arc<Collection>) {
    let journal = record_events(&todos);
    todos.changed(
        "ghost",
        Some(&fields(json!({"a": 1, "b": 2}))),
        &["b".to_owned()],
    );
    assert_eq!(todos.get("ghost").expect("doc").fields(), &fields(json!({"a": 1})));
    assert_eq!(journal.entries(), vec!["will-add:ghost", "did-add:ghost"]);
}

#[rstest]
fn removed_fires_events_and_ignores_missing(todos: Arc<Collection>) {
    todos.added("a", Map::new());
    let journal = record_events(&todos);
    assert!(todos.removed("a"));
    assert!(!todos.removed("a"));
    assert!(todos.is_empty());
    assert_eq!(journal.entries(), vec!["will-remove:a", "did-remove:a"]);
}

#[rstest]
#[case::forward("a", Some("d"), &["b", "c", "a", "d"])]
#[case::backward("d", Some("b"), &["a", "d", "b", "c"])]
#[case::to_end("b", None, &["a", "c", "d", "b"])]
#[case::already_in_place("b", Some("c"), &["a", "b", "c", "d"])]
#[case::unknown_target("a", Some("zz"), &["b", "c", "d", "a"])]
fn moved_before_preserves_membership(
    todos: Arc<Collection>,
    #[case] id: &str,
    #[case] before: Option<&str>,
    #[case] expected: &[&str],
) {
    for id in ["a", "b", "c", "d"] {
        todos.added(id, Map::new());
    }
    todos.moved_before(id, before);
    assert_eq!(ids(&todos), expected);
    assert_eq!(todos.len(), 4);
}

#[rstest]
fn added_before_inserts_at_position(todos: Arc<Collection>) {
    todos.added("a", Map::new());
    todos.added("c", Map::new());
    todos.added_before("b", Map::new(), Some("c"));
    todos.added_before("d", Map::new(), None);
    assert_eq!(ids(&todos), vec!["a", "b", "c", "d"]);
}

#[rstest]
fn cursor_reads_live_state(todos: Arc<Collection>) {
    let cursor = todos.find(Selector::All);
    assert_eq!(cursor.count(), 0);
    todos.added("a", Map::new());
    assert_eq!(cursor.count(), 1);
}

#[rstest]
fn id_set_cursors_keep_requested_order(todos: Arc<Collection>) {
    for id in ["a", "b", "c"] {
        todos.added(id, Map::new());
    }
    let cursor = todos.find(vec!["c".to_owned(), "missing".to_owned(), "a".to_owned()]);
    let found: Vec<_> = cursor.fetch().iter().map(|doc| doc.id().to_owned()).collect();
    assert_eq!(found, vec!["c", "a"]);
}

#[rstest]
fn field_selectors_match_values(todos: Arc<Collection>) {
    todos.added("a", fields(json!({"done": true})));
    todos.added("b", fields(json!({"done": false})));
    let done = todos.find(fields(json!({"done": true})));
    assert_eq!(done.first().expect("match").id(), "a");
    assert_eq!(todos.find(fields(json!({"_id": "b"}))).count(), 1);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Todo {
    #[serde(rename = "_id")]
    id: String,
    title: String,
}

#[rstest]
fn cursors_decode_documents(todos: Arc<Collection>) {
    todos.added("t1", fields(json!({"title": "x"})));
    let decoded: Vec<Todo> = todos.find(Selector::All).fetch_as().expect("decode");
    assert_eq!(
        decoded,
        vec![Todo {
            id: "t1".into(),
            title: "x".into()
        }]
    );
}

#[rstest]
fn observe_delivers_initial_then_live_events(todos: Arc<Collection>) {
    todos.added("a", Map::new());
    let journal = Journal::default();
    let handle = todos.find(Selector::All).observe(record_observe(&journal));
    assert_eq!(journal.entries(), vec!["added:a"]);

    todos.added("b", Map::new());
    todos.changed("a", Some(&fields(json!({"n": 1}))), &[]);
    todos.removed("b");
    assert_eq!(
        journal.entries(),
        vec!["added:a", "added:b", "changed:a", "removed:b"]
    );

    assert!(handle.stop());
    assert!(!handle.stop());
    todos.added("c", Map::new());
    assert_eq!(journal.entries().len(), 4);
}

#[rstest]
fn observe_follows_selector_transitions(todos: Arc<Collection>) {
    let journal = Journal::default();
    let _handle = todos
        .find(fields(json!({"done": false})))
        .observe(record_observe(&journal));

    todos.added("a", fields(json!({"done": true})));
    todos.changed("a", Some(&fields(json!({"done": false}))), &[]);
    todos.changed("a", Some(&fields(json!({"done": true}))), &[]);
    assert_eq!(journal.entries(), vec!["added:a", "removed:a"]);
}

#[rstest]
fn observe_filters_changes_by_fields_of_interest(todos: Arc<Collection>) {
    todos.added("a", fields(json!({"title": "x", "views": 0})));
    let journal = Journal::default();
    let _handle = todos
        .find(Selector::All)
        .observe(record_observe(&journal).fields(["title"]));

    todos.changed("a", Some(&fields(json!({"views": 1}))), &[]);
    todos.changed("a", None, &["title".to_owned()]);
    assert_eq!(journal.entries(), vec!["added:a", "changed:a"]);
}

#[rstest]
fn mutations_from_initial_callbacks_are_not_redelivered(todos: Arc<Collection>) {
    todos.added("a", Map::new());
    let journal = Journal::default();
    let sink = journal.clone();
    let target = Arc::clone(&todos);
    let _handle = todos.find(Selector::All).observe(ObserveCallbacks::new().on_added(
        move |doc| {
            sink.push(format!("added:{}", doc.id()));
            if doc.id() == "a" {
                target.added("b", Map::new());
            }
        },
    ));
    assert_eq!(journal.entries(), vec!["added:a"]);
    assert!(todos.contains("b"));
}

#[rstest]
fn dropping_observe_handle_detaches(todos: Arc<Collection>) {
    let journal = Journal::default();
    drop(todos.find(Selector::All).observe(record_observe(&journal)));
    todos.added("a", Map::new());
    assert!(journal.entries().is_empty());
}

#[test]
fn store_creates_temporary_collections_and_upgrades_on_declare() {
    let store = CollectionStore::new();
    let temp = store.get_or_create_temporary("lists");
    temp.added("l1", Map::new());
    assert_eq!(temp.kind(), CollectionKind::Temporary);

    let declared = store.declare("lists");
    assert!(Arc::ptr_eq(&temp, &declared));
    assert_eq!(declared.kind(), CollectionKind::Declared);
    assert_eq!(declared.len(), 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn store_toggles_ready_for_every_collection() {
    let store = CollectionStore::new();
    let a = store.declare("a");
    let b = store.get_or_create_temporary("b");
    store.set_all_ready(true);
    assert!(a.is_ready() && b.is_ready());
    store.set_all_ready(false);
    assert!(!a.is_ready() && !b.is_ready());
}

#[rstest]
fn snapshot_merge_adds_and_changes(todos: Arc<Collection>) {
    todos.added("a", fields(json!({"n": 1, "keep": true})));
    let docs = parse_snapshot(r#"[{"_id":"a","n":2},{"_id":"b","n":3}]"#).expect("parse");
    let stats = todos.merge_snapshot(docs);
    assert_eq!(stats, SnapshotStats { added: 1, changed: 1 });
    assert_eq!(
        todos.get("a").expect("a").fields(),
        &fields(json!({"n": 2, "keep": true}))
    );
    assert!(todos.contains("b"));
}

#[rstest]
#[case::not_json("{")]
#[case::object(r#"{"_id":"a"}"#)]
#[case::missing_id(r#"[{"n":1}]"#)]
#[case::numeric_id(r#"[{"_id":1}]"#)]
fn invalid_snapshots_are_rejected(#[case] text: &str) {
    assert!(parse_snapshot(text).is_err());
}
