//! HTTP/1.1 upgrade handshake.
//!
//! The client sends a `GET` with a random `Sec-WebSocket-Key` and expects a
//! `101 Switching Protocols` response whose `Sec-WebSocket-Accept` is the
//! SHA-1 of the key and the RFC 6455 GUID. Any bytes read past the response
//! head are returned so the frame decoder sees them first.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{HandshakeError, TransportError, WsUrl};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the upgrade response head.
pub const MAX_RESPONSE_HEAD: usize = 16 * 1024;

const READ_CHUNK: usize = 1024;

/// Generate a fresh `Sec-WebSocket-Key`: base64 of 16 random bytes.
#[must_use]
pub fn generate_key() -> String { BASE64.encode(rand::random::<[u8; 16]>()) }

/// Compute the `Sec-WebSocket-Accept` value for `key`.
///
/// # Examples
///
/// ```
/// use ddpwire::transport::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

pub(crate) fn build_request(url: &WsUrl, key: &str) -> String {
    format!(
        "GET {resource} HTTP/1.1\r\nHost: {host}\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n",
        resource = url.resource(),
        host = url.authority(),
    )
}

/// Parsed HTTP message head: the first line plus lower-cased header pairs.
#[derive(Debug)]
pub struct ResponseHead {
    /// Status or request line.
    pub start_line: String,
    /// Header names (lower-cased) and trimmed values.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn parse(raw: &str) -> Self {
        let mut lines = raw.split("\r\n");
        let start_line = lines.next().unwrap_or_default().to_owned();
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned()))
            .collect();
        Self {
            start_line,
            headers,
        }
    }
}

/// Read an HTTP message head terminated by a blank line.
///
/// Returns the parsed head and any bytes that followed it.
///
/// # Errors
///
/// Fails when the peer closes early, the head exceeds
/// [`MAX_RESPONSE_HEAD`], or the read fails.
pub async fn read_head<S>(stream: &mut S) -> Result<(ResponseHead, Bytes), TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        if let Some(end) = find_head_end(&buf) {
            let head = buf.split_to(end);
            let raw = String::from_utf8_lossy(head.get(..end - 4).unwrap_or_default());
            return Ok((ResponseHead::parse(&raw), buf.freeze()));
        }
        if buf.len() >= MAX_RESPONSE_HEAD {
            return Err(HandshakeError::ResponseTooLarge {
                limit: MAX_RESPONSE_HEAD,
            }
            .into());
        }
        buf.reserve(READ_CHUNK);
        let read = stream.read_buf(&mut buf).await.map_err(TransportError::Connect)?;
        if read == 0 {
            return Err(HandshakeError::ConnectionClosed.into());
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Perform the client side of the upgrade on `stream`.
///
/// Returns bytes received after the response head.
pub(crate) async fn client_handshake<S>(stream: &mut S, url: &WsUrl) -> Result<Bytes, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    stream
        .write_all(build_request(url, &key).as_bytes())
        .await
        .map_err(TransportError::Connect)?;
    stream.flush().await.map_err(TransportError::Connect)?;

    let (head, leftover) = read_head(stream).await?;
    verify_response(&head, &key)?;
    debug!(url = %url, leftover = leftover.len(), "websocket upgrade complete");
    Ok(leftover)
}

fn verify_response(head: &ResponseHead, key: &str) -> Result<(), HandshakeError> {
    let mut parts = head.start_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") || status != "101" {
        return Err(HandshakeError::BadStatus(head.start_line.clone()));
    }
    if !head
        .header("upgrade")
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    {
        return Err(HandshakeError::MissingHeader("Upgrade"));
    }
    if !head.header("connection").is_some_and(|value| {
        value
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    }) {
        return Err(HandshakeError::MissingHeader("Connection"));
    }
    let expected = accept_key(key);
    match head.header("sec-websocket-accept") {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(HandshakeError::AcceptMismatch {
            expected,
            actual: actual.to_owned(),
        }),
        None => Err(HandshakeError::MissingHeader("Sec-WebSocket-Accept")),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;

    fn url() -> WsUrl { WsUrl::parse("ws://localhost:3000/websocket").expect("valid url") }

    fn response_for(request: &str, accept_override: Option<&str>) -> String {
        let key = request
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .expect("request carries a key");
        let accept = accept_override.map_or_else(|| accept_key(key), str::to_owned);
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: \
             Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        )
    }

    #[test]
    fn generated_keys_are_sixteen_bytes() {
        let key = generate_key();
        assert_eq!(BASE64.decode(key).expect("valid base64").len(), 16);
    }

    #[test]
    fn request_names_resource_and_host() {
        let request = build_request(&url(), "abc");
        assert!(request.starts_with("GET /websocket HTTP/1.1\r\n"));
        assert!(request.contains("Host: localhost:3000\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn handshake_returns_bytes_after_head() {
        let (mut client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let mut request = vec![0u8; 1024];
            let n = server.read(&mut request).await.expect("read request");
            let request = String::from_utf8_lossy(&request[..n]).into_owned();
            let mut response = response_for(&request, None).into_bytes();
            response.extend_from_slice(b"\x81\x02hi");
            server.write_all(&response).await.expect("write response");
            server
        });

        let leftover = client_handshake(&mut client, &url())
            .await
            .expect("handshake succeeds");
        assert_eq!(&leftover[..], b"\x81\x02hi");
        drop(server_task.await.expect("server task"));
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_accept() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            let mut request = vec![0u8; 1024];
            let n = server.read(&mut request).await.expect("read request");
            let request = String::from_utf8_lossy(&request[..n]).into_owned();
            let response = response_for(&request, Some("bogus"));
            server
                .write_all(response.as_bytes())
                .await
                .expect("write response");
            server
        });

        let err = client_handshake(&mut client, &url())
            .await
            .expect_err("accept mismatch");
        assert!(matches!(
            err,
            TransportError::Handshake(HandshakeError::AcceptMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn handshake_rejects_non_upgrade_status() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            let mut request = vec![0u8; 1024];
            let _ = server.read(&mut request).await.expect("read request");
            server
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await
                .expect("write response");
            server
        });

        let err = client_handshake(&mut client, &url())
            .await
            .expect_err("bad status");
        assert!(matches!(
            err,
            TransportError::Handshake(HandshakeError::BadStatus(_))
        ));
    }

    #[tokio::test]
    async fn early_close_is_reported() {
        let (mut client, server) = duplex(4096);
        drop(server);
        let err = client_handshake(&mut client, &url())
            .await
            .expect_err("closed");
        assert!(matches!(
            err,
            TransportError::Handshake(HandshakeError::ConnectionClosed) | TransportError::Connect(_)
        ));
    }
}
