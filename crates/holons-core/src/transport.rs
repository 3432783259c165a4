//! Transport URI resolution and listener construction.
//!
//! A transport URI names where a holon listens or dials:
//!
//! ```text
//! tcp://[host]:[port]        default 0.0.0.0:9090
//! unix://<path>              path required
//! stdio://
//! mem://
//! ws://host[:port][/path]    default port 80, default path /grpc
//! wss://host[:port][/path]   default port 443, secure
//! ```
//!
//! [`parse_uri`] normalizes a URI into a [`TransportDescriptor`]. [`listen`]
//! turns it into a [`Listener`]; only `tcp` binds a socket here, the other
//! schemes hand their descriptor to whatever runtime serves them.

use crate::config::TransportConfig;
use crate::{HolonsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Supported transport schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Tcp,
    Unix,
    Stdio,
    Mem,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Unix => "unix",
            Scheme::Stdio => "stdio",
            Scheme::Mem => "mem",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

impl FromStr for Scheme {
    type Err = HolonsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Scheme::Tcp),
            "unix" => Ok(Scheme::Unix),
            "stdio" => Ok(Scheme::Stdio),
            "mem" => Ok(Scheme::Mem),
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(HolonsError::UnsupportedScheme {
                uri: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized transport address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub secure: bool,
}

impl TransportDescriptor {
    /// Render the descriptor back into a transport URI.
    pub fn to_uri(&self) -> String {
        match self.scheme {
            Scheme::Tcp => format!("tcp://{}:{}", bracket_host(&self.host), self.port),
            Scheme::Unix | Scheme::Stdio | Scheme::Mem => {
                format!("{}://{}", self.scheme, self.path)
            }
            Scheme::Ws | Scheme::Wss => format!(
                "{}://{}:{}{}",
                self.scheme,
                bracket_host(&self.host),
                self.port,
                self.path
            ),
        }
    }
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Extract the scheme from a transport URI.
///
/// Returns the whole input when it carries no `://` separator.
pub fn scheme(uri: &str) -> &str {
    match uri.find(TransportConfig::SCHEME_SEPARATOR) {
        Some(idx) => &uri[..idx],
        None => uri,
    }
}

/// Parse a transport URI into a normalized descriptor.
pub fn parse_uri(uri: &str) -> Result<TransportDescriptor> {
    let Some((raw_scheme, rest)) = uri.split_once(TransportConfig::SCHEME_SEPARATOR) else {
        return Err(HolonsError::UnsupportedScheme {
            uri: uri.to_string(),
        });
    };
    let scheme = Scheme::from_str(raw_scheme).map_err(|_| HolonsError::UnsupportedScheme {
        uri: uri.to_string(),
    })?;

    match scheme {
        Scheme::Tcp => {
            let (host, port) = split_host_port(
                uri,
                rest,
                TransportConfig::DEFAULT_TCP_HOST,
                TransportConfig::DEFAULT_TCP_PORT,
            )?;
            Ok(TransportDescriptor {
                scheme,
                host,
                port,
                path: String::new(),
                secure: false,
            })
        }
        Scheme::Unix => {
            if rest.is_empty() {
                return Err(HolonsError::invalid_argument(format!(
                    "unix transport requires a socket path: {}",
                    uri
                )));
            }
            Ok(TransportDescriptor {
                scheme,
                host: String::new(),
                port: 0,
                path: rest.to_string(),
                secure: false,
            })
        }
        Scheme::Stdio | Scheme::Mem => Ok(TransportDescriptor {
            scheme,
            host: String::new(),
            port: 0,
            path: rest.to_string(),
            secure: false,
        }),
        Scheme::Ws | Scheme::Wss => {
            let secure = scheme == Scheme::Wss;
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let default_port = if secure {
                TransportConfig::DEFAULT_WSS_PORT
            } else {
                TransportConfig::DEFAULT_WS_PORT
            };
            let (host, port) = split_host_port(
                uri,
                authority,
                TransportConfig::DEFAULT_WS_HOST,
                default_port,
            )?;
            let path = if path.is_empty() || path == "/" {
                TransportConfig::DEFAULT_WS_PATH.to_string()
            } else {
                path.to_string()
            };
            Ok(TransportDescriptor {
                scheme,
                host,
                port,
                path,
                secure,
            })
        }
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 literals.
fn split_host_port(
    uri: &str,
    authority: &str,
    default_host: &str,
    default_port: u16,
) -> Result<(String, u16)> {
    let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped.split_once(']').ok_or_else(|| {
            HolonsError::invalid_argument(format!("unterminated IPv6 literal in {}", uri))
        })?;
        match tail {
            "" => (host, None),
            _ => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => {
                    return Err(HolonsError::invalid_argument(format!(
                        "malformed host:port in {}",
                        uri
                    )))
                }
            },
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let host = if host.is_empty() {
        default_host.to_string()
    } else {
        host.to_string()
    };

    let port = match port {
        None | Some("") => default_port,
        Some(raw) => raw.parse::<u16>().map_err(|_| {
            HolonsError::invalid_argument(format!("invalid port {:?} in {}", raw, uri))
        })?,
    };

    Ok((host, port))
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// A listening endpoint produced by [`listen`].
///
/// Only the `Tcp` variant owns an OS socket; the others carry the
/// descriptor for an external serving runtime.
#[derive(Debug)]
pub enum Listener {
    Tcp {
        listener: TcpListener,
        descriptor: TransportDescriptor,
    },
    Unix(TransportDescriptor),
    Stdio(TransportDescriptor),
    Mem(TransportDescriptor),
    Ws(TransportDescriptor),
    Wss(TransportDescriptor),
}

impl Listener {
    /// Descriptor this listener was built from.
    pub fn descriptor(&self) -> &TransportDescriptor {
        match self {
            Listener::Tcp { descriptor, .. } => descriptor,
            Listener::Unix(d)
            | Listener::Stdio(d)
            | Listener::Mem(d)
            | Listener::Ws(d)
            | Listener::Wss(d) => d,
        }
    }

    /// Bound address of a tcp listener; `None` for the passive variants.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp { listener, .. } => listener.local_addr().ok(),
            _ => None,
        }
    }
}

/// Parse a transport URI and build its listener.
///
/// For `tcp` this binds immediately and may fail with an address-in-use
/// IO error.
pub async fn listen(uri: &str) -> Result<Listener> {
    let descriptor = parse_uri(uri)?;

    match descriptor.scheme {
        Scheme::Tcp => {
            let addr = resolve_bind_addr(&descriptor.host, descriptor.port).await?;
            let listener = TcpListener::bind(addr).await?;
            info!(
                "Transport listening on {}",
                listener.local_addr().unwrap_or(addr)
            );
            Ok(Listener::Tcp {
                listener,
                descriptor,
            })
        }
        Scheme::Unix => Ok(Listener::Unix(descriptor)),
        Scheme::Stdio => Ok(Listener::Stdio(descriptor)),
        Scheme::Mem => Ok(Listener::Mem(descriptor)),
        Scheme::Ws => Ok(Listener::Ws(descriptor)),
        Scheme::Wss => Ok(Listener::Wss(descriptor)),
    }
}

async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    match host {
        "0.0.0.0" => return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))),
        "::" => return Ok(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))),
        _ => {}
    }

    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    let addr = addrs
        .next()
        .ok_or_else(|| HolonsError::invalid_argument(format!("cannot resolve host {}", host)))?;
    debug!("Resolved {}:{} to {}", host, port, addr);
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_extraction() {
        assert_eq!(scheme("tcp://:9090"), "tcp");
        assert_eq!(scheme("unix:///tmp/x.sock"), "unix");
        assert_eq!(scheme("stdio://"), "stdio");
        assert_eq!(scheme("mem://"), "mem");
        assert_eq!(scheme("ws://127.0.0.1:8080/grpc"), "ws");
        assert_eq!(scheme("wss://example.com:443/grpc"), "wss");
        assert_eq!(scheme("no-separator"), "no-separator");
    }

    #[test]
    fn test_tcp_defaults() {
        for uri in ["tcp://", "tcp://:9090", TransportConfig::DEFAULT_URI] {
            let parsed = parse_uri(uri).unwrap();
            assert_eq!(parsed.scheme, Scheme::Tcp);
            assert_eq!(parsed.host, "0.0.0.0");
            assert_eq!(parsed.port, 9090);
            assert!(!parsed.secure);
        }
    }

    #[test]
    fn test_tcp_explicit_host_and_port() {
        let parsed = parse_uri("tcp://127.0.0.1:0").unwrap();
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.port, 0);

        let parsed = parse_uri("tcp://localhost").unwrap();
        assert_eq!(parsed.host, "localhost");
        assert_eq!(parsed.port, 9090);
    }

    #[test]
    fn test_tcp_ipv6_literals() {
        let parsed = parse_uri("tcp://[::1]:7000").unwrap();
        assert_eq!(parsed.host, "::1");
        assert_eq!(parsed.port, 7000);

        let parsed = parse_uri("tcp://:::7000").unwrap();
        assert_eq!(parsed.host, "::");
        assert_eq!(parsed.port, 7000);
        assert_eq!(parsed.to_uri(), "tcp://[::]:7000");
    }

    #[test]
    fn test_tcp_malformed_port_fails() {
        assert!(matches!(
            parse_uri("tcp://host:http"),
            Err(HolonsError::InvalidArgument { .. })
        ));
        assert!(matches!(
            parse_uri("tcp://host:70000"),
            Err(HolonsError::InvalidArgument { .. })
        ));
        assert!(matches!(
            parse_uri("tcp://[::1"),
            Err(HolonsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unix_requires_path() {
        let parsed = parse_uri("unix:///tmp/holon.sock").unwrap();
        assert_eq!(parsed.scheme, Scheme::Unix);
        assert_eq!(parsed.path, "/tmp/holon.sock");

        assert!(matches!(
            parse_uri("unix://"),
            Err(HolonsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_stdio_and_mem() {
        let stdio = parse_uri("stdio://").unwrap();
        assert_eq!(stdio.scheme, Scheme::Stdio);
        assert_eq!(stdio.port, 0);
        assert!(!stdio.secure);

        let mem = parse_uri("mem://").unwrap();
        assert_eq!(mem.scheme, Scheme::Mem);
        assert!(mem.host.is_empty());
    }

    #[test]
    fn test_ws_defaults() {
        let parsed = parse_uri("ws://example.com").unwrap();
        assert_eq!(parsed.scheme, Scheme::Ws);
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/grpc");
        assert!(!parsed.secure);
    }

    #[test]
    fn test_wss_default_path() {
        let parsed = parse_uri("wss://example.com:8443").unwrap();
        assert_eq!(parsed.scheme, Scheme::Wss);
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 8443);
        assert_eq!(parsed.path, "/grpc");
        assert!(parsed.secure);

        let parsed = parse_uri("wss://example.com").unwrap();
        assert_eq!(parsed.port, 443);
    }

    #[test]
    fn test_ws_explicit_path() {
        let parsed = parse_uri("ws://127.0.0.1:8080/holon").unwrap();
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.path, "/holon");
        assert_eq!(parsed.to_uri(), "ws://127.0.0.1:8080/holon");
    }

    #[test]
    fn test_unsupported_scheme() {
        for uri in ["ftp://host", "http://host:80", "garbage", ""] {
            assert!(
                matches!(parse_uri(uri), Err(HolonsError::UnsupportedScheme { .. })),
                "{} should be rejected",
                uri
            );
        }
    }

    #[tokio::test]
    async fn test_tcp_listen_binds() {
        let listener = listen("tcp://127.0.0.1:0").await.unwrap();
        assert!(matches!(listener, Listener::Tcp { .. }));
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() > 0);
        assert_eq!(listener.descriptor().host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_tcp_listen_address_in_use() {
        let first = listen("tcp://127.0.0.1:0").await.unwrap();
        let port = first.local_addr().unwrap().port();
        let second = listen(&format!("tcp://127.0.0.1:{}", port)).await;
        assert!(matches!(second, Err(HolonsError::Io { .. })));
    }

    #[tokio::test]
    async fn test_passive_listen_variants() {
        assert!(matches!(listen("stdio://").await.unwrap(), Listener::Stdio(_)));
        assert!(matches!(listen("mem://").await.unwrap(), Listener::Mem(_)));
        assert!(matches!(
            listen("unix:///tmp/never-bound.sock").await.unwrap(),
            Listener::Unix(_)
        ));

        let ws = listen("ws://127.0.0.1:8080/holon").await.unwrap();
        let Listener::Ws(descriptor) = &ws else {
            panic!("expected ws listener, got {:?}", ws);
        };
        assert_eq!(descriptor.host, "127.0.0.1");
        assert_eq!(descriptor.port, 8080);
        assert_eq!(descriptor.path, "/holon");
        assert!(!descriptor.secure);
        assert!(ws.local_addr().is_none());

        assert!(matches!(
            listen("wss://example.com").await.unwrap(),
            Listener::Wss(_)
        ));
    }

    #[tokio::test]
    async fn test_listen_unsupported_uri() {
        assert!(listen("ftp://host").await.is_err());
    }
}
