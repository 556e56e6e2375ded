//! Parsing and serialisation of the variable-length frame header.

use bytes::{BufMut, BytesMut};

use super::Opcode;
use crate::{
    byte_order::{read_network_u16, read_network_u64, write_network_u16, write_network_u64},
    codec::FramingError,
};

/// Length of the client masking key.
pub const MASK_KEY_LEN: usize = 4;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN7_MASK: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN flag.
    pub fin: bool,
    /// Reserved bits, right-aligned.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, present on client-to-server frames.
    pub mask: Option<[u8; MASK_KEY_LEN]>,
    /// Declared payload length.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Number of header bytes needed to decode a header whose first two bytes
    /// are `src[..2]`, or `2` when fewer bytes are available.
    #[must_use]
    pub fn required_len(src: &[u8]) -> usize {
        let Some(&second) = src.get(1) else {
            return 2;
        };
        let extended = match second & LEN7_MASK {
            LEN16_MARKER => 2,
            LEN64_MARKER => 8,
            _ => 0,
        };
        let mask = if second & MASK_BIT == 0 { 0 } else { MASK_KEY_LEN };
        2 + extended + mask
    }

    /// Parse a header from the front of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, or the header together
    /// with the number of bytes it occupies.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] for reserved opcodes, 64-bit lengths with
    /// the most significant bit set, and malformed control frames.
    pub fn parse(src: &[u8]) -> Result<Option<(Self, usize)>, FramingError> {
        let needed = Self::required_len(src);
        let Some(head) = src.get(..needed) else {
            return Ok(None);
        };
        let [first, second, rest @ ..] = head else {
            return Ok(None);
        };

        let raw_opcode = first & OPCODE_MASK;
        let opcode =
            Opcode::from_u8(raw_opcode).ok_or(FramingError::ReservedOpcode { opcode: raw_opcode })?;
        let fin = first & FIN_BIT != 0;
        let rsv = (first & RSV_MASK) >> 4;

        let (payload_len, rest) = match (second & LEN7_MASK, rest) {
            (LEN16_MARKER, [a, b, rest @ ..]) => (u64::from(read_network_u16([*a, *b])), rest),
            (LEN64_MARKER, [a, b, c, d, e, f, g, h, rest @ ..]) => {
                let len = read_network_u64([*a, *b, *c, *d, *e, *f, *g, *h]);
                if len >> 63 != 0 {
                    return Err(FramingError::LengthOverflow { declared: len });
                }
                (len, rest)
            }
            (len, rest) => (u64::from(len), rest),
        };

        let mask = match rest {
            [a, b, c, d] if second & MASK_BIT != 0 => Some([*a, *b, *c, *d]),
            _ => None,
        };

        if opcode.is_control() && (!fin || payload_len > MAX_CONTROL_PAYLOAD as u64) {
            return Err(FramingError::InvalidControlFrame {
                opcode: raw_opcode,
                len: payload_len,
            });
        }

        Ok(Some((
            Self {
                fin,
                rsv,
                opcode,
                mask,
                payload_len,
            },
            needed,
        )))
    }

    /// Number of bytes [`FrameHeader::write`] produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let extended = match self.payload_len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        let mask = if self.mask.is_some() { MASK_KEY_LEN } else { 0 };
        2 + extended + mask
    }

    /// Serialise the header using the shortest length encoding.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        let fin = if self.fin { FIN_BIT } else { 0 };
        dst.put_u8(fin | ((self.rsv << 4) & RSV_MASK) | self.opcode.as_u8());

        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };
        match self.payload_len {
            len @ 0..=125 => {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "match arm bounds the length to 7 bits"
                )]
                dst.put_u8(mask_bit | len as u8);
            }
            len @ 126..=0xFFFF => {
                dst.put_u8(mask_bit | LEN16_MARKER);
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "match arm bounds the length to 16 bits"
                )]
                dst.put_slice(&write_network_u16(len as u16));
            }
            len => {
                dst.put_u8(mask_bit | LEN64_MARKER);
                dst.put_slice(&write_network_u64(len));
            }
        }

        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }
}
