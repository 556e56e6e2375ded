//! Parsing of `ws://` and `wss://` endpoint URLs.

use std::fmt;

use url::{Host, Url};

use super::TransportError;

/// A validated WebSocket endpoint.
///
/// # Examples
///
/// ```
/// use ddpwire::transport::WsUrl;
///
/// let url = WsUrl::parse("ws://localhost:3000/websocket").expect("valid url");
/// assert_eq!(url.host(), "localhost");
/// assert_eq!(url.port(), 3000);
/// assert_eq!(url.resource(), "/websocket");
/// assert!(!url.is_secure());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsUrl {
    secure: bool,
    host: String,
    port: u16,
    default_port: bool,
    resource: String,
}

impl WsUrl {
    /// Parse and validate `input`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when the URL cannot be parsed or
    /// has no host, and [`TransportError::UnsupportedScheme`] for schemes
    /// other than `ws` and `wss`.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let url = Url::parse(input).map_err(|e| TransportError::InvalidUrl {
            url: input.to_owned(),
            reason: e.to_string(),
        })?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(TransportError::UnsupportedScheme(other.to_owned())),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(TransportError::InvalidUrl {
                    url: input.to_owned(),
                    reason: "missing host".to_owned(),
                });
            }
        };
        let default = if secure { 443 } else { 80 };
        let port = url.port().unwrap_or(default);
        let mut resource = url.path().to_owned();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }
        Ok(Self {
            secure,
            host,
            port,
            default_port: port == default,
            resource,
        })
    }

    /// Build the conventional DDP endpoint `ws://host[:port]/websocket`.
    ///
    /// # Errors
    ///
    /// Returns an error when `authority` does not form a valid URL.
    pub fn ddp_endpoint(authority: &str, secure: bool) -> Result<Self, TransportError> {
        let scheme = if secure { "wss" } else { "ws" };
        Self::parse(&format!("{scheme}://{authority}/websocket"))
    }

    /// Whether the endpoint requires TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool { self.secure }

    /// Host name or address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port, defaulted from the scheme when absent.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }

    /// Path and query sent in the request line.
    #[must_use]
    pub fn resource(&self) -> &str { &self.resource }

    /// Value for the `Host` header.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for WsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{scheme}://{}{}", self.authority(), self.resource)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ws://example.com/websocket", false, "example.com", 80, "example.com")]
    #[case("wss://example.com/websocket", true, "example.com", 443, "example.com")]
    #[case("ws://127.0.0.1:3000/websocket", false, "127.0.0.1", 3000, "127.0.0.1:3000")]
    #[case("ws://[::1]:3000/websocket", false, "::1", 3000, "[::1]:3000")]
    fn parses_endpoints(
        #[case] input: &str,
        #[case] secure: bool,
        #[case] host: &str,
        #[case] port: u16,
        #[case] authority: &str,
    ) {
        let url = WsUrl::parse(input).expect("valid url");
        assert_eq!(url.is_secure(), secure);
        assert_eq!(url.host(), host);
        assert_eq!(url.port(), port);
        assert_eq!(url.authority(), authority);
        assert_eq!(url.resource(), "/websocket");
    }

    #[test]
    fn keeps_query_in_resource() {
        let url = WsUrl::parse("ws://h/sock?x=1").expect("valid url");
        assert_eq!(url.resource(), "/sock?x=1");
        assert_eq!(url.to_string(), "ws://h/sock?x=1");
    }

    #[test]
    fn rejects_http_scheme() {
        assert!(matches!(
            WsUrl::parse("http://example.com/"),
            Err(TransportError::UnsupportedScheme(s)) if s == "http"
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            WsUrl::parse("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn builds_ddp_endpoint() {
        let url = WsUrl::ddp_endpoint("localhost:3000", false).expect("valid");
        assert_eq!(url.to_string(), "ws://localhost:3000/websocket");
    }
}
