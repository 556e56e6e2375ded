//! WebSocket frame model.
//!
//! A [`Frame`] is one unit of the RFC 6455 framing layer: a FIN flag, three
//! reserved bits, an [`Opcode`] and an unmasked payload. Masking is applied by
//! the codec on the wire; frames held in memory are always plain.

use bytes::{BufMut, Bytes, BytesMut};

use crate::byte_order::{read_network_u16, write_network_u16};

mod header;

pub use header::{FrameHeader, MASK_KEY_LEN, MAX_CONTROL_PAYLOAD};

/// Frame opcode carried in the low nibble of the first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continues a fragmented text or binary message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Opaque binary data.
    Binary,
    /// Connection close with an optional status code and reason.
    Close,
    /// Liveness probe; must be answered with a [`Opcode::Pong`].
    Ping,
    /// Reply to a [`Opcode::Ping`].
    Pong,
}

impl Opcode {
    /// Decode an opcode nibble, returning `None` for reserved values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Encode this opcode as its wire nibble.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Returns `true` for close, ping and pong.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Close | Self::Ping | Self::Pong) }
}

/// A single WebSocket frame with an unmasked payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    rsv: u8,
    opcode: Opcode,
    payload: Bytes,
}

impl Frame {
    /// Construct a final frame with the given opcode and payload.
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            payload: payload.into(),
        }
    }

    /// Construct a final text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self { Self::new(Opcode::Text, text.into()) }

    /// Construct a final binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Binary, payload) }

    /// Construct a ping frame.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping, payload) }

    /// Construct a pong frame echoing `payload`.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong, payload) }

    /// Construct a close frame carrying `code` and a UTF-8 `reason`.
    ///
    /// The reason is truncated on a character boundary so the payload fits
    /// in a control frame.
    #[must_use]
    pub fn close(code: CloseCode, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        let mut payload = BytesMut::with_capacity(2 + end);
        payload.put_slice(&write_network_u16(code.as_u16()));
        payload.put_slice(reason.get(..end).unwrap_or_default().as_bytes());
        Self::new(Opcode::Close, payload.freeze())
    }

    /// Construct a continuation fragment.
    #[must_use]
    pub fn continuation(payload: impl Into<Bytes>, fin: bool) -> Self {
        Self::new(Opcode::Continuation, payload).with_fin(fin)
    }

    /// Rebuild a frame from decoded header parts.
    #[must_use]
    pub fn from_parts(fin: bool, rsv: u8, opcode: Opcode, payload: Bytes) -> Self {
        Self {
            fin,
            rsv: rsv & 0b111,
            opcode,
            payload,
        }
    }

    /// Return a copy of this frame with the FIN flag set to `fin`.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Whether this frame ends its message.
    #[must_use]
    pub fn is_final(&self) -> bool { self.fin }

    /// The three reserved bits, right-aligned.
    #[must_use]
    pub fn rsv(&self) -> u8 { self.rsv }

    /// The frame opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode { self.opcode }

    /// Borrow the unmasked payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame and return its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

/// Status code carried by a close frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol violation.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Received a data type the endpoint cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// No status code was present in the close frame.
    pub const NO_STATUS: Self = Self(1005);
    /// Connection dropped without a close frame. Never sent on the wire.
    pub const ABNORMAL: Self = Self(1006);
    /// Text payload was not valid UTF-8.
    pub const INVALID_PAYLOAD: Self = Self(1007);
    /// Message exceeded the configured size limit.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);

    /// Wrap a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self { Self(code) }

    /// Return the raw status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 { self.0 }

    /// Whether the code may appear in a close frame on the wire.
    ///
    /// `1005`, `1006` and `1015` only describe local conditions.
    #[must_use]
    pub const fn is_sendable(self) -> bool { !matches!(self.0, 1005 | 1006 | 1015) }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

/// Decoded body of a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Status code, or [`CloseCode::NO_STATUS`] when the payload was empty.
    pub code: CloseCode,
    /// UTF-8 reason text; invalid sequences are replaced.
    pub reason: String,
}

impl CloseFrame {
    /// Parse a close payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use ddpwire::frame::{CloseCode, CloseFrame};
    ///
    /// let close = CloseFrame::parse(&[0x03, 0xE8, b'b', b'y', b'e']);
    /// assert_eq!(close.code, CloseCode::NORMAL);
    /// assert_eq!(close.reason, "bye");
    /// ```
    #[must_use]
    pub fn parse(payload: &[u8]) -> Self {
        match payload {
            [hi, lo, reason @ ..] => Self {
                code: CloseCode(read_network_u16([*hi, *lo])),
                reason: String::from_utf8_lossy(reason).into_owned(),
            },
            _ => Self {
                code: CloseCode::NO_STATUS,
                reason: String::new(),
            },
        }
    }
}

/// XOR `buf` in place with the repeating 4-byte mask `key`.
///
/// Masking is its own inverse, so the same call masks and unmasks.
pub fn apply_mask(buf: &mut [u8], key: [u8; MASK_KEY_LEN]) {
    for (byte, mask) in buf.iter_mut().zip(key.iter().cycle()) {
        *byte ^= mask;
    }
}

#[cfg(test)]
mod tests;
