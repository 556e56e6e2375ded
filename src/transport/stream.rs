//! TCP connection setup with optional TLS.

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpSocket, TcpStream, lookup_host},
};
use tracing::debug;

use super::{SocketOptions, TransportError, WsUrl};

/// A plain TCP stream or, with the `tls` feature, a TLS session over one.
pub enum MaybeTlsStream {
    /// Unencrypted `ws://` connection.
    Plain(TcpStream),
    /// Encrypted `wss://` connection.
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl std::fmt::Debug for MaybeTlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(stream) => f.debug_tuple("Plain").field(stream).finish(),
            #[cfg(feature = "tls")]
            Self::Tls(_) => f.write_str("Tls(..)"),
        }
    }
}

/// Resolve `url`, connect to the first reachable address and negotiate TLS
/// when the scheme asks for it.
pub(crate) async fn open(
    url: &WsUrl,
    options: &SocketOptions,
) -> Result<MaybeTlsStream, TransportError> {
    if url.is_secure() && !cfg!(feature = "tls") {
        return Err(TransportError::TlsUnavailable);
    }

    let addrs: Vec<SocketAddr> = lookup_host((url.host(), url.port()))
        .await
        .map_err(TransportError::Connect)?
        .collect();
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in addrs {
        match connect_addr(addr, options).await {
            Ok(stream) => {
                debug!(%addr, "tcp connection established");
                return wrap(stream, url).await;
            }
            Err(err) => {
                debug!(%addr, error = %err, "tcp connect attempt failed");
                last_err = err;
            }
        }
    }
    Err(TransportError::Connect(last_err))
}

async fn connect_addr(addr: SocketAddr, options: &SocketOptions) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    options.apply(&socket)?;
    socket.connect(addr).await
}

#[cfg(not(feature = "tls"))]
#[expect(clippy::unused_async, reason = "signature matches the TLS variant")]
async fn wrap(stream: TcpStream, _url: &WsUrl) -> Result<MaybeTlsStream, TransportError> {
    Ok(MaybeTlsStream::Plain(stream))
}

#[cfg(feature = "tls")]
async fn wrap(stream: TcpStream, url: &WsUrl) -> Result<MaybeTlsStream, TransportError> {
    use std::sync::Arc;

    use tokio_rustls::{
        TlsConnector,
        rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
    };

    if !url.is_secure() {
        return Ok(MaybeTlsStream::Plain(stream));
    }
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = ServerName::try_from(url.host().to_owned())
        .map_err(|e| TransportError::Connect(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let tls = TlsConnector::from(Arc::new(config))
        .connect(name, stream)
        .await
        .map_err(TransportError::Connect)?;
    Ok(MaybeTlsStream::Tls(Box::new(tls)))
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
