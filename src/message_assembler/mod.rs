//! Reassembly of fragmented WebSocket data messages.
//!
//! A [`MessageAssembler`] accepts data frames (text, binary and
//! continuation) in arrival order and yields a [`DataMessage`] once a frame
//! with FIN set completes the open message. Control frames never reach the
//! assembler; the transport answers them directly.
//!
//! Every violation is returned as a [`CodecError`]; the caller picks the
//! reaction from [`CodecError::default_recovery_policy`]. For the
//! recoverable ones (a stray continuation, or a new data frame while a
//! fragment is open) the assembler has already discarded the offending data
//! and is ready for the next message.

use bytes::{Bytes, BytesMut};

use crate::{
    codec::{CodecError, ProtocolError},
    frame::{Frame, Opcode},
};

/// A complete application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataMessage {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
}

impl DataMessage {
    /// Length of the message body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the message body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[derive(Debug)]
struct PartialMessage {
    opcode: Opcode,
    buffer: BytesMut,
}

/// Per-transport reassembly state.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message_size: usize,
    partial: Option<PartialMessage>,
}

impl MessageAssembler {
    /// Create an assembler that rejects messages larger than
    /// `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            partial: None,
        }
    }

    /// Whether no fragmented message is currently open.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.partial.is_none() }

    /// Discard any partially assembled message.
    pub fn reset(&mut self) { self.partial = None; }

    /// Feed one data frame.
    ///
    /// Returns `Ok(Some(message))` when the frame completes a message and
    /// `Ok(None)` when more fragments are needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedContinuation`] for a continuation
    /// with no open message and [`ProtocolError::InterleavedDataFrame`] for a
    /// data frame arriving while a message is open; the frame and any open
    /// message are discarded. Returns [`ProtocolError::MessageTooLarge`] when
    /// the message would exceed the configured limit and
    /// [`ProtocolError::InvalidUtf8`] when a completed text message is not
    /// valid UTF-8, discarding the open message.
    pub fn push(&mut self, frame: Frame) -> Result<Option<DataMessage>, CodecError> {
        let opcode = frame.opcode();
        let fin = frame.is_final();
        match opcode {
            Opcode::Text | Opcode::Binary => {
                if self.partial.take().is_some() {
                    return Err(ProtocolError::InterleavedDataFrame.into());
                }
                self.check_size(frame.payload().len())?;
                if fin {
                    return finish(opcode, frame.into_payload()).map(Some);
                }
                self.partial = Some(PartialMessage {
                    opcode,
                    buffer: BytesMut::from(frame.payload().as_ref()),
                });
                Ok(None)
            }
            Opcode::Continuation => {
                let Some(partial) = self.partial.as_mut() else {
                    return Err(ProtocolError::UnexpectedContinuation.into());
                };
                let size = partial.buffer.len().saturating_add(frame.payload().len());
                if size > self.max_message_size {
                    self.partial = None;
                    return Err(ProtocolError::MessageTooLarge {
                        size,
                        max: self.max_message_size,
                    }
                    .into());
                }
                partial.buffer.extend_from_slice(frame.payload());
                if !fin {
                    return Ok(None);
                }
                match self.partial.take() {
                    Some(done) => finish(done.opcode, done.buffer.freeze()).map(Some),
                    None => Ok(None),
                }
            }
            Opcode::Close | Opcode::Ping | Opcode::Pong => Ok(None),
        }
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            }
            .into());
        }
        Ok(())
    }
}

fn finish(opcode: Opcode, payload: Bytes) -> Result<DataMessage, CodecError> {
    if opcode == Opcode::Binary {
        return Ok(DataMessage::Binary(payload));
    }
    String::from_utf8(payload.to_vec())
        .map(DataMessage::Text)
        .map_err(|_| ProtocolError::InvalidUtf8.into())
}

#[cfg(test)]
mod tests;
