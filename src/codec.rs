//! WebSocket framing codec.
//!
//! [`WebSocketCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`]
//! for [`Frame`] values. The codec is role-aware: in the client role every
//! outgoing frame is masked with a fresh random key, while the server role
//! writes frames unmasked. Inbound frames are unmasked whenever the peer set a
//! masking key.
//!
//! # Error Handling
//!
//! Decoding failures are reported through the [`CodecError`] taxonomy and
//! surface as [`io::Error`] values so the codec composes with `FramedRead`.
//! Every framing error is fatal to the stream: once a header is rejected the
//! frame boundary is lost. Truncation at EOF is reported as an [`EofError`].

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Frame, FrameHeader, MASK_KEY_LEN, apply_mask};

pub mod error;

pub use error::{CodecError, EofError, FramingError, ProtocolError, RecoveryPolicy};

/// Minimum frame length in bytes.
///
/// Frame lengths passed to codec constructors are clamped to at least this
/// value so a close frame always fits.
pub const MIN_FRAME_LENGTH: usize = 128;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to codec constructors are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Which end of the connection the codec serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Masks outgoing frames.
    Client,
    /// Writes outgoing frames unmasked.
    Server,
}

/// Frame codec for RFC 6455 streams.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use ddpwire::{
///     codec::WebSocketCodec,
///     frame::{Frame, Opcode},
/// };
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut client = WebSocketCodec::client(1024);
/// let mut server = WebSocketCodec::server(1024);
/// let mut buf = BytesMut::new();
/// client.encode(Frame::text("hi"), &mut buf).expect("encode");
///
/// let frame = server.decode(&mut buf).expect("decode").expect("complete");
/// assert_eq!(frame.opcode(), Opcode::Text);
/// assert_eq!(&frame.payload()[..], b"hi");
/// ```
#[derive(Clone, Debug)]
pub struct WebSocketCodec {
    role: Role,
    max_frame_length: usize,
}

impl WebSocketCodec {
    /// Construct a codec for `role` with a clamped maximum frame length.
    #[must_use]
    pub fn new(role: Role, max_frame_length: usize) -> Self {
        Self {
            role,
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Construct a client-role codec.
    #[must_use]
    pub fn client(max_frame_length: usize) -> Self { Self::new(Role::Client, max_frame_length) }

    /// Construct a server-role codec.
    #[must_use]
    pub fn server(max_frame_length: usize) -> Self { Self::new(Role::Server, max_frame_length) }

    /// The role this codec encodes for.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn checked_payload_len(&self, declared: u64) -> Result<usize, CodecError> {
        let len = usize::try_from(declared).map_err(|_| FramingError::LengthOverflow { declared })?;
        if len > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            }
            .into());
        }
        Ok(len)
    }
}

impl Default for WebSocketCodec {
    fn default() -> Self { Self::client(MAX_FRAME_LENGTH) }
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((header, header_len)) = FrameHeader::parse(src).map_err(CodecError::from)? else {
            src.reserve(FrameHeader::required_len(src).saturating_sub(src.len()));
            return Ok(None);
        };

        let payload_len = self.checked_payload_len(header.payload_len)?;
        let total = header_len
            .checked_add(payload_len)
            .ok_or(CodecError::Framing(FramingError::LengthOverflow {
                declared: header.payload_len,
            }))?;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        if let Some(key) = header.mask {
            apply_mask(&mut payload, key);
        }
        Ok(Some(Frame::from_parts(
            header.fin,
            header.rsv,
            header.opcode,
            payload.freeze(),
        )))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src)),
        }
    }
}

/// Build the appropriate EOF error based on remaining buffer state.
///
/// - [`EofError::MidHeader`]: the header (including any extended length and masking key) was cut
///   short.
/// - [`EofError::MidFrame`]: the header was complete but the payload was truncated.
fn build_eof_error(src: &BytesMut) -> io::Error {
    let bytes_received = src.len();
    match FrameHeader::parse(src) {
        Ok(Some((header, header_len))) => CodecError::Eof(EofError::MidFrame {
            bytes_received: bytes_received.saturating_sub(header_len),
            expected: usize::try_from(header.payload_len).unwrap_or(usize::MAX),
        })
        .into(),
        Ok(None) => CodecError::Eof(EofError::MidHeader {
            bytes_received,
            header_size: FrameHeader::required_len(src),
        })
        .into(),
        Err(e) => CodecError::Framing(e).into(),
    }
}

impl Encoder<Frame> for WebSocketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();
        if payload.len() > self.max_frame_length {
            return Err(CodecError::Framing(FramingError::OversizedFrame {
                size: payload.len(),
                max: self.max_frame_length,
            })
            .into());
        }

        let mask = match self.role {
            Role::Client => Some(rand::random::<[u8; MASK_KEY_LEN]>()),
            Role::Server => None,
        };
        let header = FrameHeader {
            fin: item.is_final(),
            rsv: item.rsv(),
            opcode: item.opcode(),
            mask,
            payload_len: payload.len() as u64,
        };

        dst.reserve(header.encoded_len() + payload.len());
        header.write(dst);
        let start = dst.len();
        dst.extend_from_slice(payload);
        if let (Some(key), Some(body)) = (mask, dst.get_mut(start..)) {
            apply_mask(body, key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
