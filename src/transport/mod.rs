//! WebSocket transport.
//!
//! A [`Transport`] owns one upgraded connection. Reading happens through a
//! [`TransportReader`], which reassembles data messages and answers control
//! frames itself. Writing happens through cloneable [`TransportSender`]
//! handles that feed a single writer task, so concurrent callers never
//! interleave frame bytes.

use std::{
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    time::timeout,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::{
    codec::{MAX_FRAME_LENGTH, WebSocketCodec},
    frame::{CloseCode, CloseFrame, Frame, Opcode},
    message_assembler::{DataMessage, MessageAssembler},
    rewind_stream::RewindStream,
};

mod error;
pub mod handshake;
mod outbox;
mod socket;
mod stream;
mod url;

pub use error::{HandshakeError, TransportError};
pub use handshake::{accept_key, generate_key};
pub use outbox::{Outbox, OutboxHandle, Priority};
pub use socket::SocketOptions;
pub use stream::MaybeTlsStream;
pub use url::WsUrl;

/// Object-safe alias for the byte streams a transport can run over.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

type BoxedStream = Box<dyn ByteStream>;

/// Tunables for a single transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Largest single frame payload accepted or sent.
    pub max_frame_length: usize,
    /// Largest reassembled message accepted.
    pub max_message_size: usize,
    /// Capacity of each outbox lane.
    pub outbox_capacity: usize,
    /// Options applied to the TCP socket.
    pub socket_options: SocketOptions,
    /// Deadline for TCP connect plus the HTTP upgrade.
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
            max_message_size: MAX_FRAME_LENGTH,
            outbox_capacity: 64,
            socket_options: SocketOptions::default().nodelay(true),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct CloseState {
    sent: AtomicBool,
    received: Mutex<Option<CloseFrame>>,
}

impl CloseState {
    /// Returns `true` for the first caller only.
    fn begin(&self) -> bool { !self.sent.swap(true, Ordering::AcqRel) }

    fn is_sent(&self) -> bool { self.sent.load(Ordering::Acquire) }

    fn record(&self, frame: CloseFrame) {
        *self.received.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    fn received(&self) -> Option<CloseFrame> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// An upgraded WebSocket connection.
#[derive(Debug)]
pub struct Transport {
    reader: TransportReader,
    sender: TransportSender,
}

impl Transport {
    /// Connect to `url`, perform the HTTP upgrade and start the writer task.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when resolution, connection, TLS or the
    /// upgrade fails, or when they take longer than
    /// [`TransportConfig::handshake_timeout`].
    pub async fn connect(url: &WsUrl, config: &TransportConfig) -> Result<Self, TransportError> {
        let limit = config.handshake_timeout;
        let establish = async {
            let mut stream = stream::open(url, &config.socket_options).await?;
            let leftover = handshake::client_handshake(&mut stream, url).await?;
            Ok::<_, TransportError>((stream, leftover))
        };
        let (stream, leftover) = timeout(limit, establish)
            .await
            .unwrap_or(Err(TransportError::HandshakeTimeout(limit)))?;
        Ok(Self::from_upgraded(stream, leftover, config))
    }

    /// Wrap a stream whose upgrade has already completed.
    ///
    /// `leftover` holds bytes read past the upgrade response. Must be called
    /// from within a Tokio runtime because it spawns the writer task.
    pub fn from_upgraded<S>(stream: S, leftover: Bytes, config: &TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedStream = Box::new(RewindStream::new(leftover, stream));
        let (read_half, write_half) = tokio::io::split(boxed);
        let codec = WebSocketCodec::client(config.max_frame_length);
        let (outbox, handle) = Outbox::with_capacity(config.outbox_capacity);
        let close = Arc::new(CloseState::default());

        tokio::spawn(write_loop(
            FramedWrite::new(write_half, codec.clone()),
            outbox,
        ));

        let sender = TransportSender {
            outbox: handle,
            close,
        };
        let reader = TransportReader {
            frames: FramedRead::new(read_half, codec),
            assembler: MessageAssembler::new(config.max_message_size),
            sender: sender.clone(),
        };
        Self { reader, sender }
    }

    /// Split into the read side and a cloneable send side.
    #[must_use]
    pub fn split(self) -> (TransportReader, TransportSender) { (self.reader, self.sender) }
}

async fn write_loop(mut sink: FramedWrite<WriteHalf<BoxedStream>, WebSocketCodec>, mut outbox: Outbox) {
    while let Some((priority, frame)) = outbox.recv().await {
        let is_close = frame.opcode() == Opcode::Close;
        if let Err(err) = sink.send(frame).await {
            warn!(error = %err, ?priority, "websocket write failed");
            break;
        }
        if is_close {
            debug!("close frame written; writer stopping");
            break;
        }
    }
    outbox.close();
    if let Err(err) = sink.close().await {
        debug!(error = %err, "websocket shutdown failed");
    }
}

/// Cloneable send side of a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportSender {
    outbox: OutboxHandle,
    close: Arc<CloseState>,
}

impl TransportSender {
    /// Send a text message as a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriterClosed`] when the writer has stopped
    /// or a close frame has already been queued.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send_data(Frame::text(text)).await
    }

    async fn send_data(&self, frame: Frame) -> Result<(), TransportError> {
        if self.close.is_sent() {
            return Err(TransportError::WriterClosed);
        }
        self.outbox.push(frame, Priority::Data).await
    }

    /// Begin the closing handshake.
    ///
    /// Only the first close request queues a frame; later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriterClosed`] if the writer has stopped.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        if !self.close.begin() {
            return Ok(());
        }
        self.outbox
            .push(Frame::close(code, reason), Priority::Control)
            .await
    }

    /// Whether a close frame has been queued by either side.
    #[must_use]
    pub fn is_closing(&self) -> bool { self.close.is_sent() }

    /// Whether the writer task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.outbox.is_closed() }

    fn reply_close(&self, frame: Frame) {
        if self.close.begin() {
            if let Err(err) = self.outbox.try_push(frame, Priority::Control) {
                debug!(error = %err, "close reply not queued");
            }
        }
    }
}

/// Read side of a [`Transport`].
pub struct TransportReader {
    frames: FramedRead<ReadHalf<BoxedStream>, WebSocketCodec>,
    assembler: MessageAssembler,
    sender: TransportSender,
}

impl std::fmt::Debug for TransportReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportReader")
            .field("assembler", &self.assembler)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl TransportReader {
    /// Read the next complete data message.
    ///
    /// Pings are answered with pongs and pongs are discarded. Returns
    /// `Ok(None)` after the peer's close frame has been received and
    /// answered; the close status is then available from
    /// [`TransportReader::close_frame`].
    ///
    /// This method is cancel safe: partially received messages stay buffered
    /// in the reader.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::StreamClosed`] when the stream ends without a
    /// close frame, and [`TransportError::Codec`] for framing or assembly
    /// failures. Fatal errors queue a close frame with a matching status.
    pub async fn next_message(&mut self) -> Result<Option<DataMessage>, TransportError> {
        loop {
            let Some(next) = self.frames.next().await else {
                if self.sender.close.received().is_some() {
                    return Ok(None);
                }
                return Err(TransportError::StreamClosed);
            };
            let frame = match next {
                Ok(frame) => frame,
                Err(err) => return Err(self.fail(TransportError::from(err))),
            };

            match frame.opcode() {
                Opcode::Ping => {
                    let pong = Frame::pong(frame.into_payload());
                    if let Err(err) = self.sender.outbox.try_push(pong, Priority::Control) {
                        debug!(error = %err, "pong not queued");
                    }
                }
                Opcode::Pong => debug!(len = frame.payload().len(), "pong received"),
                Opcode::Close => {
                    let close = CloseFrame::parse(frame.payload());
                    info!(code = %close.code, reason = %close.reason, "peer sent close frame");
                    let reply = if close.code == CloseCode::NO_STATUS {
                        Frame::new(Opcode::Close, Bytes::new())
                    } else {
                        Frame::close(close.code, "")
                    };
                    self.sender.close.record(close);
                    self.sender.reply_close(reply);
                    return Ok(None);
                }
                Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                    match self.assembler.push(frame) {
                        Ok(Some(message)) => return Ok(Some(message)),
                        Ok(None) => {}
                        Err(err) if !err.should_disconnect() => {
                            warn!(error = %err, kind = err.error_type(), "discarding data frame");
                        }
                        Err(err) => return Err(self.fail(TransportError::Codec(err))),
                    }
                }
            }
        }
    }

    /// The close frame received from the peer, if any.
    #[must_use]
    pub fn close_frame(&self) -> Option<CloseFrame> { self.sender.close.received() }

    /// A send handle sharing this transport's writer.
    #[must_use]
    pub fn sender(&self) -> &TransportSender { &self.sender }

    fn fail(&mut self, err: TransportError) -> TransportError {
        if let TransportError::Codec(codec) = &err
            && codec.should_disconnect()
            && codec.close_code().is_sendable()
        {
            warn!(error = %codec, kind = codec.error_type(), "failing websocket connection");
            self.sender
                .reply_close(Frame::close(codec.close_code(), "protocol failure"));
        }
        self.assembler.reset();
        err
    }
}
