use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Result, TransportError};

/// Default gateway port. The control channel listens here; the data
/// channel listens one port above.
pub const DEFAULT_PORT: u16 = 54321;

/// Default gateway host when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where the local gateway lives.
///
/// The gateway exposes one listener per socket channel: control at `port`,
/// data at `port + 1`. The `secure` flag selects the scheme for the REST
/// surface only — the channel sockets are plain TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Gateway host name or address.
    pub host: String,
    /// Base gateway port (control channel).
    pub port: u16,
    /// Whether the REST surface uses TLS.
    pub secure: bool,
}

impl Endpoint {
    /// Create an endpoint for an explicit host and base port.
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Endpoint for a gateway on the local host at the default port.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, false)
    }

    /// Resolved address of the control-channel listener.
    pub fn control_addr(&self) -> Result<SocketAddr> {
        self.resolve(self.port)
    }

    /// Resolved address of the data-channel listener.
    pub fn data_addr(&self) -> Result<SocketAddr> {
        self.resolve(self.port + 1)
    }

    /// Base URL of the gateway's REST surface.
    pub fn rest_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    fn resolve(&self, port: u16) -> Result<SocketAddr> {
        let mut addrs =
            (self.host.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| TransportError::Resolve {
                    host: self.host.clone(),
                    port,
                    source: e,
                })?;
        addrs.next().ok_or_else(|| TransportError::Resolve {
            host: self.host.clone(),
            port,
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            ),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_port_is_one_above_control() {
        let ep = Endpoint::new("127.0.0.1", 54321, false);
        assert_eq!(ep.control_addr().unwrap().port(), 54321);
        assert_eq!(ep.data_addr().unwrap().port(), 54322);
    }

    #[test]
    fn rest_base_url_follows_tls_flag() {
        let plain = Endpoint::new("10.0.0.7", 54321, false);
        assert_eq!(plain.rest_base_url(), "http://10.0.0.7:54321");

        let tls = Endpoint::new("gateway.local", 54321, true);
        assert_eq!(tls.rest_base_url(), "https://gateway.local:54321");
    }

    #[test]
    fn unresolvable_host_is_a_resolve_error() {
        let ep = Endpoint::new("no-such-host.invalid", 1, false);
        assert!(matches!(
            ep.control_addr(),
            Err(TransportError::Resolve { .. })
        ));
    }

    #[test]
    fn localhost_defaults() {
        let ep = Endpoint::localhost();
        assert_eq!(ep.host, DEFAULT_HOST);
        assert_eq!(ep.port, DEFAULT_PORT);
        assert!(!ep.secure);
    }
}
