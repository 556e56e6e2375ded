//! Async stream adapter that replays leftover bytes.
//!
//! The HTTP upgrade response is read in chunks, so the final read can pull in
//! the first WebSocket frames as well. `RewindStream` hands those bytes back
//! to the frame decoder before delegating to the socket.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream adapter that yields buffered bytes before reading from the
/// underlying stream. Writes always go straight to the inner stream.
pub struct RewindStream<S> {
    leftover: Bytes,
    inner: S,
}

impl<S> RewindStream<S> {
    /// Wrap `inner`, replaying `leftover` first.
    pub fn new(leftover: impl Into<Bytes>, inner: S) -> Self {
        Self {
            leftover: leftover.into(),
            inner,
        }
    }

    /// Bytes still waiting to be replayed.
    #[must_use]
    pub fn pending(&self) -> usize { self.leftover.len() }

    /// Unwrap the adapter, discarding any unreplayed bytes.
    pub fn into_inner(self) -> S { self.inner }
}

impl<S: AsyncRead + Unpin> AsyncRead for RewindStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.leftover.has_remaining() {
            return Pin::new(&mut self.inner).poll_read(cx, buf);
        }
        let to_copy = self.leftover.len().min(buf.remaining());
        let chunk = self.leftover.split_to(to_copy);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for RewindStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn replays_leftover_before_inner_stream() {
        let (mut near, far) = tokio::io::duplex(64);
        near.write_all(b" world").await.expect("write inner bytes");
        drop(near);

        let mut stream = RewindStream::new(&b"hello"[..], far);
        assert_eq!(stream.pending(), 5);
        let mut out = String::new();
        stream.read_to_string(&mut out).await.expect("read all");
        assert_eq!(out, "hello world");
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test]
    async fn small_reads_drain_leftover_in_pieces() {
        let mut stream = RewindStream::new(&b"abc"[..], tokio::io::empty());
        let mut two = [0u8; 2];
        let n = stream.read(&mut two).await.expect("first read");
        assert_eq!(&two[..n], b"ab");
        let n = stream.read(&mut two).await.expect("second read");
        assert_eq!(&two[..n], b"c");
        let n = stream.read(&mut two).await.expect("eof");
        assert_eq!(n, 0);
    }
}
