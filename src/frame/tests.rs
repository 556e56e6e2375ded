//! Unit tests for frame headers, close payloads and masking.

use bytes::BytesMut;
use rstest::rstest;

use super::*;
use crate::codec::FramingError;

#[rstest]
#[case::short(5, &[0x81, 0x05][..])]
#[case::sixteen_bit(126, &[0x81, 0x7E, 0x00, 0x7E][..])]
#[case::sixteen_bit_max(65_535, &[0x81, 0x7E, 0xFF, 0xFF][..])]
#[case::sixty_four_bit(65_536, &[0x81, 0x7F, 0, 0, 0, 0, 0, 1, 0, 0][..])]
fn header_uses_shortest_length_encoding(#[case] len: u64, #[case] expected: &[u8]) {
    let header = FrameHeader {
        fin: true,
        rsv: 0,
        opcode: Opcode::Text,
        mask: None,
        payload_len: len,
    };
    let mut buf = BytesMut::new();
    header.write(&mut buf);
    assert_eq!(&buf[..], expected);
    assert_eq!(header.encoded_len(), expected.len());

    let (parsed, consumed) = FrameHeader::parse(&buf)
        .expect("header parses")
        .expect("header complete");
    assert_eq!(parsed, header);
    assert_eq!(consumed, expected.len());
}

#[test]
fn masked_header_carries_key() {
    let header = FrameHeader {
        fin: false,
        rsv: 0b100,
        opcode: Opcode::Binary,
        mask: Some([1, 2, 3, 4]),
        payload_len: 3,
    };
    let mut buf = BytesMut::new();
    header.write(&mut buf);
    assert_eq!(&buf[..], &[0x42, 0x83, 1, 2, 3, 4]);

    let (parsed, consumed) = FrameHeader::parse(&buf)
        .expect("header parses")
        .expect("header complete");
    assert_eq!(parsed, header);
    assert_eq!(consumed, 6);
}

#[rstest]
#[case::empty(&[][..])]
#[case::one_byte(&[0x81][..])]
#[case::partial_extended(&[0x81, 0x7E, 0x01][..])]
#[case::partial_mask(&[0x81, 0x85, 1, 2][..])]
fn incomplete_header_requests_more_bytes(#[case] bytes: &[u8]) {
    assert_eq!(FrameHeader::parse(bytes), Ok(None));
}

#[test]
fn reserved_opcode_is_rejected() {
    assert_eq!(
        FrameHeader::parse(&[0x83, 0x00]),
        Err(FramingError::ReservedOpcode { opcode: 3 })
    );
}

#[test]
fn length_with_high_bit_overflows() {
    let bytes = [0x82, 0x7F, 0x80, 0, 0, 0, 0, 0, 0, 1];
    assert!(matches!(
        FrameHeader::parse(&bytes),
        Err(FramingError::LengthOverflow { .. })
    ));
}

#[rstest]
#[case::fragmented_ping(&[0x09, 0x00][..])]
#[case::long_pong(&[0x8A, 0x7E, 0x00, 0x7E][..])]
fn malformed_control_frames_are_rejected(#[case] bytes: &[u8]) {
    assert!(matches!(
        FrameHeader::parse(bytes),
        Err(FramingError::InvalidControlFrame { .. })
    ));
}

#[test]
fn opcode_nibbles_round_trip() {
    for opcode in [
        Opcode::Continuation,
        Opcode::Text,
        Opcode::Binary,
        Opcode::Close,
        Opcode::Ping,
        Opcode::Pong,
    ] {
        assert_eq!(Opcode::from_u8(opcode.as_u8()), Some(opcode));
    }
    assert!(Opcode::Ping.is_control());
    assert!(!Opcode::Text.is_control());
}

#[test]
fn close_frame_round_trips_code_and_reason() {
    let frame = Frame::close(CloseCode::GOING_AWAY, "shutting down");
    let close = CloseFrame::parse(frame.payload());
    assert_eq!(close.code, CloseCode::GOING_AWAY);
    assert_eq!(close.reason, "shutting down");
}

#[test]
fn empty_close_payload_has_no_status() {
    let close = CloseFrame::parse(&[]);
    assert_eq!(close.code, CloseCode::NO_STATUS);
    assert!(close.reason.is_empty());
}

#[test]
fn close_reason_is_truncated_on_char_boundary() {
    let reason = "é".repeat(100);
    let frame = Frame::close(CloseCode::NORMAL, &reason);
    assert!(frame.payload().len() <= MAX_CONTROL_PAYLOAD);
    let close = CloseFrame::parse(frame.payload());
    assert!(close.reason.chars().all(|c| c == 'é'));
}

#[test]
fn masking_is_an_involution() {
    let key = [0x37, 0xFA, 0x21, 0x3D];
    let mut buf = *b"Hello";
    apply_mask(&mut buf, key);
    assert_eq!(buf, [0x7F, 0x9F, 0x4D, 0x51, 0x58]);
    apply_mask(&mut buf, key);
    assert_eq!(&buf, b"Hello");
}
