//! In-process DDP server for integration tests.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use ddpwire::{
    codec::{MAX_FRAME_LENGTH, WebSocketCodec},
    frame::{CloseCode, CloseFrame, Frame, Opcode},
    transport::accept_key,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_util::codec::Framed;

/// Longest a peer waits for the next client frame before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Listener that upgrades incoming connections to WebSocket.
#[derive(Debug)]
pub struct MockServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockServer {
    /// Bind to a free localhost port.
    ///
    /// # Errors
    ///
    /// Returns any IO error raised while binding.
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// Address the server listens on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// DDP endpoint URL for this server.
    #[must_use]
    pub fn url(&self) -> String { format!("ws://{}/websocket", self.addr) }

    /// Accept one client and complete the WebSocket upgrade.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the client disconnects or sends a request
    /// without a `Sec-WebSocket-Key` header.
    pub async fn accept(&self) -> io::Result<MockPeer> {
        let (mut stream, _) = self.listener.accept().await?;
        let key = read_upgrade_key(&mut stream).await?;
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
             Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(&key)
        );
        stream.write_all(response.as_bytes()).await?;
        Ok(MockPeer {
            framed: Framed::new(stream, WebSocketCodec::server(MAX_FRAME_LENGTH)),
        })
    }

    /// Accept a TCP connection and drop it without answering.
    ///
    /// # Errors
    ///
    /// Returns any IO error raised by `accept`.
    pub async fn accept_and_drop(&self) -> io::Result<()> {
        let (stream, _) = self.listener.accept().await?;
        drop(stream);
        Ok(())
    }

    /// Accept a TCP connection and hold it open without ever answering the
    /// upgrade request.
    ///
    /// # Errors
    ///
    /// Returns any IO error raised by `accept`.
    pub async fn accept_silently(&self) -> io::Result<TcpStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

async fn read_upgrade_key(stream: &mut TcpStream) -> io::Result<String> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > MAX_REQUEST_HEAD {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head);
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("sec-websocket-key"))
        .map(|(_, value)| value.trim().to_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key"))
}

/// Server side of one upgraded client connection.
pub struct MockPeer {
    framed: Framed<TcpStream, WebSocketCodec>,
}

impl MockPeer {
    /// Next frame from the client, or `None` once the stream ends.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`RECV_TIMEOUT`] or the frame does
    /// not decode.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("client frame within timeout")
            .map(|frame| frame.expect("client frame decodes"))
    }

    /// Next DDP message from the client, or `None` once it closes.
    ///
    /// WebSocket pings are answered and pongs skipped.
    ///
    /// # Panics
    ///
    /// Panics on a binary frame, invalid JSON or a timeout.
    pub async fn recv_json(&mut self) -> Option<Value> {
        loop {
            let frame = self.recv_frame().await?;
            match frame.opcode() {
                Opcode::Text => {
                    return Some(
                        serde_json::from_slice(frame.payload()).expect("client sent valid JSON"),
                    );
                }
                Opcode::Ping => self.send_frame(Frame::pong(frame.into_payload())).await,
                Opcode::Pong => {}
                Opcode::Close => return None,
                other => panic!("unexpected {other:?} frame from client"),
            }
        }
    }

    /// Next DDP message of kind `msg`, skipping heartbeats.
    ///
    /// # Panics
    ///
    /// Panics if the client closes or sends a different kind first.
    pub async fn expect_msg(&mut self, msg: &str) -> Value {
        loop {
            let value = self
                .recv_json()
                .await
                .unwrap_or_else(|| panic!("client closed while waiting for {msg}"));
            match value["msg"].as_str() {
                Some(kind) if kind == msg => return value,
                Some("ping" | "pong") => {}
                _ => panic!("expected {msg}, got {value}"),
            }
        }
    }

    /// Send a DDP message.
    ///
    /// # Panics
    ///
    /// Panics if the client has gone away.
    pub async fn send_json(&mut self, value: Value) {
        self.send_frame(Frame::text(value.to_string())).await;
    }

    /// Send a raw frame.
    ///
    /// # Panics
    ///
    /// Panics if the client has gone away.
    pub async fn send_frame(&mut self, frame: Frame) {
        self.framed.send(frame).await.expect("send frame to client");
    }

    /// Complete the DDP handshake and return the client's `connect`.
    pub async fn handshake(&mut self, session: &str) -> Value {
        let connect = self.expect_msg("connect").await;
        self.send_json(json!({"msg": "connected", "session": session}))
            .await;
        connect
    }

    /// Reject the client's `connect`, proposing `version`.
    pub async fn reject_version(&mut self, version: &str) -> Value {
        let connect = self.expect_msg("connect").await;
        self.send_json(json!({"msg": "failed", "version": version}))
            .await;
        connect
    }

    /// Answer a `sub` with `ready` and return its id.
    pub async fn ready_next_sub(&mut self) -> String {
        let sub = self.expect_msg("sub").await;
        let id = sub["id"].as_str().expect("sub id").to_owned();
        self.send_json(json!({"msg": "ready", "subs": [id]})).await;
        id
    }

    /// Send a close frame and wait for the client's reply.
    pub async fn close(mut self, code: CloseCode, reason: &str) -> Option<CloseFrame> {
        self.send_frame(Frame::close(code, reason)).await;
        loop {
            let frame = self.recv_frame().await?;
            if frame.opcode() == Opcode::Close {
                return Some(CloseFrame::parse(frame.payload()));
            }
        }
    }

    /// Drop the TCP connection without a close handshake.
    pub fn drop_connection(self) { drop(self.framed); }
}
