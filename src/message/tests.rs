//! Unit tests for DDP message decoding and encoding.

use rstest::rstest;
use serde_json::json;

use super::*;

fn decode_message(text: &str) -> DdpMessage {
    match Inbound::decode(text).expect("decodes") {
        Inbound::Message(message) => message,
        other => panic!("expected a DDP message, got {other:?}"),
    }
}

#[test]
fn connect_advertises_version_and_support() {
    let message = DdpMessage::connect("1", &["1".to_owned(), "pre2".to_owned()]);
    let value: Value = serde_json::from_str(&message.encode().expect("encode")).expect("json");
    assert_eq!(
        value,
        json!({"msg": "connect", "version": "1", "support": ["1", "pre2"]})
    );
}

#[test]
fn method_encodes_id_name_and_params() {
    let message = DdpMessage::Method {
        id: "echo-2".into(),
        method: "echo".into(),
        params: vec![json!("hi")],
    };
    let value: Value = serde_json::from_str(&message.encode().expect("encode")).expect("json");
    assert_eq!(
        value,
        json!({"msg": "method", "id": "echo-2", "method": "echo", "params": ["hi"]})
    );
}

#[test]
fn added_decodes_fields() {
    let message =
        decode_message(r#"{"msg":"added","collection":"todos","id":"t1","fields":{"title":"x"}}"#);
    let DdpMessage::Added {
        id,
        collection,
        fields,
    } = message
    else {
        panic!("expected added");
    };
    assert_eq!(id, "t1");
    assert_eq!(collection, "todos");
    assert_eq!(fields.get("title"), Some(&json!("x")));
}

#[test]
fn added_without_fields_has_empty_map() {
    let message = decode_message(r#"{"msg":"added","collection":"c","id":"a"}"#);
    assert!(matches!(message, DdpMessage::Added { fields, .. } if fields.is_empty()));
}

#[test]
fn changed_carries_optional_fields_and_cleared() {
    let message =
        decode_message(r#"{"msg":"changed","collection":"c","id":"a","cleared":["b"]}"#);
    assert_eq!(
        message,
        DdpMessage::Changed {
            id: "a".into(),
            collection: "c".into(),
            fields: None,
            cleared: Some(vec!["b".into()]),
        }
    );
}

#[rstest]
#[case::null_before(r#"{"msg":"movedBefore","collection":"c","id":"a","before":null}"#, None)]
#[case::missing_before(r#"{"msg":"movedBefore","collection":"c","id":"a"}"#, None)]
#[case::named_before(
    r#"{"msg":"movedBefore","collection":"c","id":"a","before":"b"}"#,
    Some("b")
)]
fn moved_before_target_is_optional(#[case] text: &str, #[case] expected: Option<&str>) {
    let DdpMessage::MovedBefore { before, .. } = decode_message(text) else {
        panic!("expected movedBefore");
    };
    assert_eq!(before.as_deref(), expected);
}

#[test]
fn result_with_error_decodes_method_error() {
    let message = decode_message(
        r#"{"msg":"result","id":"m-1","error":{"error":403,"reason":"denied","errorType":"Meteor.Error"}}"#,
    );
    let DdpMessage::MethodResult { id, error, result } = message else {
        panic!("expected result");
    };
    assert_eq!(id, "m-1");
    assert_eq!(result, None);
    let error = error.expect("error present");
    assert_eq!(error.error, ErrorCode::from(403_i64));
    assert_eq!(error.reason.as_deref(), Some("denied"));
    assert_eq!(error.error_type.as_deref(), Some("Meteor.Error"));
    assert_eq!(error.to_string(), "method error 403: denied");
}

#[test]
fn string_error_codes_are_accepted() {
    let message = decode_message(r#"{"msg":"nosub","id":"s-1","error":{"error":"not-found"}}"#);
    let DdpMessage::Nosub { error, .. } = message else {
        panic!("expected nosub");
    };
    assert_eq!(error.expect("error").error, ErrorCode::from("not-found"));
}

#[test]
fn server_id_greeting_is_recognised() {
    assert_eq!(
        Inbound::decode(r#"{"server_id":"0"}"#).expect("decode"),
        Inbound::ServerId("0".into())
    );
}

#[test]
fn unknown_kind_is_not_an_error() {
    let inbound = Inbound::decode(r#"{"msg":"teleport","id":"x"}"#).expect("decode");
    assert!(matches!(inbound, Inbound::Unknown { kind, .. } if kind == "teleport"));
}

#[rstest]
#[case::not_json("{not json")]
#[case::array("[1,2]")]
#[case::no_msg(r#"{"id":"x"}"#)]
#[case::numeric_msg(r#"{"msg":5}"#)]
#[case::missing_field(r#"{"msg":"connected"}"#)]
fn malformed_payloads_are_errors(#[case] text: &str) {
    assert!(Inbound::decode(text).is_err());
}

#[test]
fn every_kind_is_known() {
    let samples = [
        DdpMessage::connect("1", &["1".to_owned()]),
        DdpMessage::Connected {
            session: "s".into(),
        },
        DdpMessage::Failed {
            version: "1".into(),
        },
        DdpMessage::Ping { id: None },
        DdpMessage::Pong {
            id: Some("p".into()),
        },
        DdpMessage::Sub {
            id: "s".into(),
            name: "n".into(),
            params: Vec::new(),
        },
        DdpMessage::Unsub { id: "s".into() },
        DdpMessage::Nosub {
            id: "s".into(),
            error: None,
        },
        DdpMessage::Added {
            id: "a".into(),
            collection: "c".into(),
            fields: Map::new(),
        },
        DdpMessage::AddedBefore {
            id: "a".into(),
            collection: "c".into(),
            fields: Map::new(),
            before: None,
        },
        DdpMessage::Changed {
            id: "a".into(),
            collection: "c".into(),
            fields: None,
            cleared: None,
        },
        DdpMessage::MovedBefore {
            id: "a".into(),
            collection: "c".into(),
            before: None,
        },
        DdpMessage::Removed {
            id: "a".into(),
            collection: "c".into(),
        },
        DdpMessage::Ready { subs: Vec::new() },
        DdpMessage::Updated {
            methods: Vec::new(),
        },
        DdpMessage::Method {
            id: "m".into(),
            method: "x".into(),
            params: Vec::new(),
        },
        DdpMessage::MethodResult {
            id: "m".into(),
            error: None,
            result: Some(json!(1)),
        },
        DdpMessage::ServerError {
            reason: "bad".into(),
            offending_message: None,
        },
    ];
    assert_eq!(samples.len(), KNOWN_KINDS.len());
    for message in samples {
        assert!(KNOWN_KINDS.contains(&message.kind()));
        let text = message.encode().expect("encode");
        assert_eq!(decode_message(&text), message);
    }
}
