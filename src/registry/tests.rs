//! Unit tests for request correlation.

use std::{sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::message::ErrorCode;

struct Harness {
    registry: Arc<CallRegistry>,
    sent: mpsc::UnboundedReceiver<DdpMessage>,
}

#[fixture]
fn harness() -> Harness {
    // registry without a call timeout
    build(None)
}

fn build(call_timeout: Option<Duration>) -> Harness {
    let (tx, sent) = mpsc::unbounded_channel();
    Harness {
        registry: Arc::new(CallRegistry::new(tx, call_timeout)),
        sent,
    }
}

#[rstest]
#[tokio::test]
async fn result_resolves_call_once(harness: Harness) {
    let (call, message) = harness.registry.register_method("echo", vec![json!("hi")]);
    assert_eq!(message.kind(), "method");
    assert_eq!(call.id(), "echo-1");

    assert!(harness.registry.resolve("echo-1", None, Some(json!("hi"))));
    assert!(!harness.registry.resolve("echo-1", None, Some(json!("again"))));
    assert_eq!(call.result().await.expect("result"), json!("hi"));
    assert!(call.is_complete());
    assert!(!call.is_updated());
}

#[rstest]
#[tokio::test]
async fn missing_result_value_is_null(harness: Harness) {
    let (call, _) = harness.registry.register_method("noop", Vec::new());
    harness.registry.resolve(call.id(), None, None);
    assert_eq!(call.result().await.expect("result"), Value::Null);
}

#[rstest]
#[tokio::test]
async fn updated_and_result_arrive_independently(harness: Harness) {
    let (call, _) = harness.registry.register_method("save", Vec::new());
    let id = call.id().to_owned();

    harness.registry.mark_updated(std::slice::from_ref(&id));
    assert!(call.is_updated());
    assert!(!call.is_complete());
    assert_eq!(harness.registry.pending_calls(), 1);

    harness.registry.resolve(&id, None, Some(json!(true)));
    assert_eq!(call.durable().await.expect("durable"), json!(true));
    assert_eq!(harness.registry.pending_calls(), 0);
}

#[rstest]
#[tokio::test]
async fn method_errors_surface_through_result(harness: Harness) {
    let (call, _) = harness.registry.register_method("fail", Vec::new());
    harness.registry.resolve(
        call.id(),
        Some(MethodError::new(500_i64, "boom")),
        None,
    );
    let err = call.result().await.expect_err("method error");
    assert!(matches!(err, CallError::Method(ref e) if e.error == ErrorCode::from(500_i64)));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

#[rstest]
#[tokio::test]
async fn typed_results_decode(harness: Harness) {
    let (call, _) = harness.registry.register_method("origin", Vec::new());
    harness
        .registry
        .resolve(call.id(), None, Some(json!({"x": 0, "y": 1})));
    assert_eq!(
        call.result_as::<Point>().await.expect("point"),
        Point { x: 0, y: 1 }
    );
}

#[rstest]
#[tokio::test]
async fn coercion_failure_without_error_is_reported(harness: Harness) {
    let (call, _) = harness.registry.register_method("origin", Vec::new());
    harness
        .registry
        .resolve(call.id(), None, Some(json!("not a point")));
    let err = call.result_as::<Point>().await.expect_err("coercion");
    assert!(matches!(err, CallError::Coercion { ref method, .. } if method == "origin"));
}

#[rstest]
#[tokio::test]
async fn server_error_wins_over_coercion_failure(harness: Harness) {
    let (call, _) = harness.registry.register_method("origin", Vec::new());
    harness.registry.resolve(
        call.id(),
        Some(MethodError::new("denied", "no access")),
        Some(json!("junk")),
    );
    let err = call.result_as::<Point>().await.expect_err("method error");
    assert!(matches!(err, CallError::Method(_)));
}

#[tokio::test(start_paused = true)]
async fn calls_time_out_at_deadline() {
    let harness = build(Some(Duration::from_secs(5)));
    let (call, _) = harness.registry.register_method("slow", Vec::new());
    let err = call.result().await.expect_err("timeout");
    assert!(matches!(err, CallError::Timeout { ref id } if id == "slow-1"));
}

#[rstest]
#[tokio::test]
async fn abandoned_calls_report_session_closed(harness: Harness) {
    let (call, _) = harness.registry.register_method("pending", Vec::new());
    let waiter = tokio::spawn({
        let call = call.clone();
        async move { call.result().await }
    });
    tokio::task::yield_now().await;
    harness.registry.abandon_all();
    let err = waiter.await.expect("join").expect_err("closed");
    assert!(matches!(err, CallError::SessionClosed { .. }));
}

#[rstest]
fn unknown_result_ids_are_ignored(harness: Harness) {
    assert!(!harness.registry.resolve("ghost-9", None, None));
    harness.registry.mark_updated(&["ghost-9".to_owned()]);
    assert_eq!(harness.registry.pending_calls(), 0);
}

#[rstest]
fn ids_are_shared_between_methods_and_subscriptions(harness: Harness) {
    let (_sub, message) = harness.registry.register_subscription("todos", Vec::new());
    let (call, _) = harness.registry.register_method("echo", Vec::new());
    let Some(DdpMessage::Sub { id, .. }) = message else {
        panic!("expected sub message");
    };
    assert_eq!(id, "todos-1");
    assert_eq!(call.id(), "echo-2");
}

#[rstest]
#[tokio::test]
async fn ready_marks_subscription_ready(harness: Harness) {
    let (sub, _) = harness.registry.register_subscription("todos", Vec::new());
    assert_eq!(sub.status(), SubscriptionStatus::Pending);
    harness.registry.mark_ready(&[sub.id()]);
    sub.ready().await.expect("ready");
    assert!(sub.is_ready());
}

#[rstest]
fn pending_duplicate_subscriptions_are_reused(harness: Harness) {
    let (first, message) = harness
        .registry
        .register_subscription("todos", vec![json!({"list": 1})]);
    assert!(message.is_some());
    let (second, message) = harness
        .registry
        .register_subscription("todos", vec![json!({"list": 1})]);
    assert!(message.is_none());
    assert_eq!(first.id(), second.id());

    let (_, message) = harness
        .registry
        .register_subscription("todos", vec![json!({"list": 2})]);
    assert!(message.is_some());
}

#[rstest]
#[tokio::test]
async fn nosub_with_error_fails_subscription(harness: Harness) {
    let (sub, _) = harness.registry.register_subscription("secret", Vec::new());
    let error = MethodError::new(403_i64, "denied");
    harness.registry.nosub(&sub.id(), Some(error.clone()));
    assert_eq!(sub.ready().await, Err(SubscriptionError::Failed(error)));
    assert_eq!(harness.registry.active_subscriptions(), 0);
}

#[rstest]
#[tokio::test]
async fn stop_sends_unsub_once(mut harness: Harness) {
    let (sub, _) = harness.registry.register_subscription("todos", Vec::new());
    let id = sub.id();
    assert!(sub.stop());
    assert!(!sub.stop());
    assert_eq!(sub.ready().await, Err(SubscriptionError::Stopped));

    let sent = harness.sent.try_recv().expect("unsub queued");
    assert_eq!(sent, DdpMessage::Unsub { id });
    assert!(harness.sent.try_recv().is_err());
    assert_eq!(harness.registry.active_subscriptions(), 0);
}

#[rstest]
fn resubscribe_reissues_under_fresh_ids(harness: Harness) {
    let (todos, _) = harness.registry.register_subscription("todos", Vec::new());
    let (lists, _) = harness.registry.register_subscription("lists", vec![json!(1)]);
    harness.registry.mark_ready(&[todos.id(), lists.id()]);

    let messages = harness.registry.resubscribe_all();
    let ids: Vec<_> = messages
        .iter()
        .map(|message| match message {
            DdpMessage::Sub { id, .. } => id.clone(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec!["todos-3".to_owned(), "lists-4".to_owned()]);
    assert_eq!(todos.id(), "todos-3");
    assert_eq!(lists.status(), SubscriptionStatus::Pending);

    harness.registry.mark_ready(&["todos-1".to_owned()]);
    assert!(!todos.is_ready());
    harness.registry.mark_ready(&[todos.id()]);
    assert!(todos.is_ready());
}

#[rstest]
fn stopped_subscriptions_are_not_resubscribed(harness: Harness) {
    let (sub, _) = harness.registry.register_subscription("todos", Vec::new());
    sub.stop();
    assert!(harness.registry.resubscribe_all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timed_out_calls_leave_the_registry() {
    let harness = build(Some(Duration::from_millis(10)));
    for _ in 0..100 {
        let (call, _) = harness.registry.register_method("slow", Vec::new());
        let err = call.result().await.expect_err("timeout");
        assert!(matches!(err, CallError::Timeout { .. }));
    }
    assert_eq!(harness.registry.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_calls_are_swept_without_a_waiter() {
    let harness = build(Some(Duration::from_millis(10)));
    let (stale, _) = harness.registry.register_method("ignored", Vec::new());
    tokio::time::advance(Duration::from_millis(20)).await;

    let (_fresh, _) = harness.registry.register_method("next", Vec::new());
    assert_eq!(harness.registry.pending_calls(), 1);
    assert!(!harness.registry.resolve(stale.id(), None, Some(json!("late"))));
    assert!(matches!(
        stale.result().await,
        Err(CallError::Timeout { .. })
    ));
}

#[rstest]
#[tokio::test]
async fn answered_calls_settle_after_reconnect(harness: Harness) {
    let (answered, _) = harness.registry.register_method("save", Vec::new());
    let (waiting, _) = harness.registry.register_method("slow", Vec::new());
    harness
        .registry
        .resolve(answered.id(), None, Some(json!("saved")));
    assert_eq!(harness.registry.pending_calls(), 2);

    assert_eq!(harness.registry.settle_answered(), 1);
    assert_eq!(harness.registry.pending_calls(), 1);
    assert_eq!(answered.durable().await.expect("durable"), json!("saved"));
    assert!(answered.is_updated());
    assert!(!waiting.is_complete());

    harness.registry.resolve(waiting.id(), None, None);
    harness.registry.mark_updated(&[waiting.id().to_owned()]);
    assert_eq!(harness.registry.pending_calls(), 0);
}

#[rstest]
fn resubscription_retires_the_old_id(harness: Harness) {
    let (sub, _) = harness.registry.register_subscription("todos", Vec::new());
    let old = sub.id();
    assert!(harness.registry.has_subscription(&old));

    harness.registry.resubscribe_all();
    assert!(!harness.registry.has_subscription(&old));
    assert!(harness.registry.has_subscription(&sub.id()));
}
