//! Unit tests for the WebSocket codec.

use std::io;

use bytes::{BufMut, BytesMut};
use rstest::{fixture, rstest};
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::frame::Opcode;

#[fixture]
fn server() -> WebSocketCodec {
    // Accept the largest frames so length-tier cases are not clamped.
    WebSocketCodec::server(MAX_FRAME_LENGTH)
}

#[fixture]
fn client() -> WebSocketCodec {
    // Client role masks every frame it writes.
    WebSocketCodec::client(MAX_FRAME_LENGTH)
}

fn encode(codec: &mut WebSocketCodec, frame: Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    codec.encode(frame, &mut buf).expect("encode frame");
    buf
}

#[rstest]
#[case::short(125)]
#[case::sixteen_bit(126)]
#[case::sixteen_bit_upper(65_535)]
#[case::sixty_four_bit(65_536)]
fn client_frames_decode_on_server(
    mut client: WebSocketCodec,
    mut server: WebSocketCodec,
    #[case] len: usize,
) {
    let text = "x".repeat(len);
    let mut buf = encode(&mut client, Frame::text(text.clone()));
    let frame = server
        .decode(&mut buf)
        .expect("decode")
        .expect("complete frame");
    assert_eq!(frame.opcode(), Opcode::Text);
    assert!(frame.is_final());
    assert_eq!(frame.payload().as_ref(), text.as_bytes());
    assert!(buf.is_empty());
}

#[rstest]
fn client_frames_are_masked(mut client: WebSocketCodec) {
    let buf = encode(&mut client, Frame::text("hello"));
    assert_eq!(buf[1] & 0x80, 0x80, "mask bit set");
    assert_eq!(buf.len(), 2 + 4 + 5);
}

#[rstest]
fn server_frames_are_not_masked(mut server: WebSocketCodec) {
    let buf = encode(&mut server, Frame::text("hello"));
    assert_eq!(&buf[..], b"\x81\x05hello");
}

#[rstest]
fn decodes_rfc_masked_example(mut server: WebSocketCodec) {
    let mut buf = BytesMut::from(
        &[0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58][..],
    );
    let frame = server.decode(&mut buf).expect("decode").expect("complete");
    assert_eq!(frame.payload().as_ref(), b"Hello");
}

#[rstest]
fn partial_payload_waits_for_more(mut server: WebSocketCodec) {
    let mut buf = BytesMut::from(&b"\x81\x05hel"[..]);
    assert!(server.decode(&mut buf).expect("decode").is_none());
    buf.put_slice(b"lo");
    let frame = server.decode(&mut buf).expect("decode").expect("complete");
    assert_eq!(frame.payload().as_ref(), b"hello");
}

#[rstest]
fn back_to_back_frames_decode_in_order(mut server: WebSocketCodec) {
    let mut buf = BytesMut::from(&b"\x01\x03abc\x80\x02de"[..]);
    let first = server.decode(&mut buf).expect("decode").expect("first");
    let second = server.decode(&mut buf).expect("decode").expect("second");
    assert_eq!(first.opcode(), Opcode::Text);
    assert!(!first.is_final());
    assert_eq!(second.opcode(), Opcode::Continuation);
    assert!(second.is_final());
    assert_eq!(second.payload().as_ref(), b"de");
}

#[test]
fn oversized_frame_is_rejected() {
    let mut codec = WebSocketCodec::server(MIN_FRAME_LENGTH);
    let mut buf = BytesMut::from(&[0x82, 0x7E, 0x10, 0x00][..]);
    let err = codec.decode(&mut buf).expect_err("oversized frame");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[rstest]
fn overflowing_length_is_fatal(mut server: WebSocketCodec) {
    let mut buf = BytesMut::from(&[0x82, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF][..]);
    let err = server.decode(&mut buf).expect_err("overflowing length");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[rstest]
fn encoder_rejects_oversized_payload() {
    let mut codec = WebSocketCodec::client(MIN_FRAME_LENGTH);
    let mut buf = BytesMut::new();
    let err = codec
        .encode(Frame::binary(vec![0u8; MIN_FRAME_LENGTH + 1]), &mut buf)
        .expect_err("oversized payload");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(buf.is_empty());
}

#[rstest]
fn clean_eof_yields_none(mut server: WebSocketCodec) {
    let mut buf = BytesMut::new();
    assert!(server.decode_eof(&mut buf).expect("clean eof").is_none());
}

#[rstest]
#[case::mid_header(&[0x81][..])]
#[case::mid_extended_length(&[0x81, 0x7E, 0x01][..])]
#[case::mid_payload(&b"\x81\x05he"[..])]
fn truncated_stream_is_unexpected_eof(mut server: WebSocketCodec, #[case] bytes: &[u8]) {
    let mut buf = BytesMut::from(bytes);
    let err = server.decode_eof(&mut buf).expect_err("truncated");
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn frame_length_is_clamped() {
    assert_eq!(WebSocketCodec::client(1).max_frame_length(), MIN_FRAME_LENGTH);
    assert_eq!(
        WebSocketCodec::client(usize::MAX).max_frame_length(),
        MAX_FRAME_LENGTH
    );
}
