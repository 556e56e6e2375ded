//! Unit tests for fragment reassembly.

use rstest::{fixture, rstest};

use super::*;
use crate::codec::CodecError;

#[fixture]
fn assembler() -> MessageAssembler {
    // Small limit so size checks are cheap to trigger.
    MessageAssembler::new(16)
}

#[rstest]
fn unfragmented_text_completes_immediately(mut assembler: MessageAssembler) {
    let message = assembler.push(Frame::text("hello")).expect("push");
    assert_eq!(message, Some(DataMessage::Text("hello".into())));
    assert!(assembler.is_idle());
}

#[rstest]
fn fragments_are_joined_in_order(mut assembler: MessageAssembler) {
    assert_eq!(
        assembler
            .push(Frame::text("he").with_fin(false))
            .expect("first"),
        None
    );
    assert_eq!(
        assembler
            .push(Frame::continuation("ll", false))
            .expect("middle"),
        None
    );
    assert!(!assembler.is_idle());
    let message = assembler
        .push(Frame::continuation("o", true))
        .expect("last");
    assert_eq!(message, Some(DataMessage::Text("hello".into())));
    assert!(assembler.is_idle());
}

#[rstest]
fn binary_fragments_stay_binary(mut assembler: MessageAssembler) {
    assembler
        .push(Frame::binary(vec![1, 2]).with_fin(false))
        .expect("first");
    let message = assembler
        .push(Frame::continuation(vec![3], true))
        .expect("last");
    assert_eq!(message, Some(DataMessage::Binary(Bytes::from_static(&[1, 2, 3]))));
}

#[rstest]
fn stray_continuation_is_recoverable(mut assembler: MessageAssembler) {
    let err = assembler
        .push(Frame::continuation("orphan", true))
        .expect_err("stray continuation");
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolError::UnexpectedContinuation)
    ));
    assert!(!err.should_disconnect());
    assert!(assembler.is_idle());

    let next = assembler.push(Frame::text("ok")).expect("push");
    assert_eq!(next, Some(DataMessage::Text("ok".into())));
}

#[rstest]
fn interleaved_data_frame_discards_open_message(mut assembler: MessageAssembler) {
    assembler
        .push(Frame::text("stale").with_fin(false))
        .expect("first");
    let err = assembler
        .push(Frame::text("fresh"))
        .expect_err("interleaved frame");
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolError::InterleavedDataFrame)
    ));
    assert!(!err.should_disconnect());
    assert!(assembler.is_idle());

    let next = assembler.push(Frame::text("next")).expect("push");
    assert_eq!(next, Some(DataMessage::Text("next".into())));
}

#[rstest]
fn oversized_reassembly_is_rejected(mut assembler: MessageAssembler) {
    assembler
        .push(Frame::text("0123456789").with_fin(false))
        .expect("first");
    let err = assembler
        .push(Frame::continuation("0123456789", true))
        .expect_err("too large");
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolError::MessageTooLarge { size: 20, max: 16 })
    ));
    assert!(assembler.is_idle());
}

#[rstest]
fn invalid_utf8_text_is_rejected(mut assembler: MessageAssembler) {
    let frame = Frame::new(Opcode::Text, vec![0xFF, 0xFE]);
    let err = assembler.push(frame).expect_err("invalid utf-8");
    assert!(matches!(err, CodecError::Protocol(ProtocolError::InvalidUtf8)));
}

#[rstest]
fn reset_discards_partial(mut assembler: MessageAssembler) {
    assembler
        .push(Frame::text("part").with_fin(false))
        .expect("first");
    assembler.reset();
    assert!(assembler.is_idle());
}
