//! Core types shared by the certificate expiry monitor: endpoints, TLS bindings,
//! alert levels and the error enums crossing crate boundaries.

pub mod error;
pub mod ratelimiter;

use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;

pub use error::{
    ConnectError, CycleError, EndpointParseError, NotifyError, SourceError, SyntheticsError,
};

/// Port assumed for hosts declared without one.
pub const DEFAULT_TLS_PORT: u16 = 443;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A `(hostname, port)` pair reachable over TLS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub hostname: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Endpoint { hostname: hostname.into(), port: port.unwrap_or(DEFAULT_TLS_PORT) }
    }

    /// Parse `host` or `host:port`. A bare host gets [`DEFAULT_TLS_PORT`].
    pub fn parse(input: &str) -> Result<Self, EndpointParseError> {
        let input = input.trim();
        let Some((host, port)) = input.split_once(':') else {
            if input.is_empty() {
                return Err(EndpointParseError::MissingHost);
            }
            return Ok(Endpoint::new(input, None));
        };
        if port.contains(':') {
            return Err(EndpointParseError::Malformed(input.to_string()));
        }
        if host.is_empty() {
            return Err(EndpointParseError::MissingHost);
        }
        if port.is_empty() {
            return Err(EndpointParseError::MissingPort(input.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(port.to_string()))?;
        if port == 0 {
            return Err(EndpointParseError::InvalidPort("0".into()));
        }
        Ok(Endpoint::new(host, Some(port)))
    }

    /// Normalized identity, `hostname:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Host actually dialed. Wildcard labels cannot be resolved, so `*` becomes `www`.
    pub fn dial_host(&self) -> String {
        self.hostname.replace('*', "www")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// One TLS entry declared by a routing object, with its hostnames in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TlsBinding {
    pub cluster_name: String,
    pub namespace: String,
    pub name: String,
    pub secret_name: String,
    pub endpoints: Vec<Endpoint>,
}

impl TlsBinding {
    /// `host:port` strings for display; empty when the binding declares no hosts.
    pub fn hosts(&self) -> Vec<String> {
        self.endpoints.iter().map(Endpoint::key).collect()
    }

    /// `namespace/name` of the owning routing object.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguished-name fields of a leaf certificate's subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectFields {
    pub country: Vec<String>,
    pub province: Vec<String>,
    pub locality: Vec<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub common_name: String,
}

/// Expiry and subject of the certificate presented by a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSnapshot {
    pub not_after: OffsetDateTime,
    pub subject: SubjectFields,
}

/// A classified expiry, handed to every notifier alongside its binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub expiration: OffsetDateTime,
    pub level: AlertLevel,
    pub subject: SubjectFields,
}

impl Alert {
    pub fn new(snapshot: CertificateSnapshot, level: AlertLevel) -> Self {
        Alert { expiration: snapshot.not_after, level, subject: snapshot.subject }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn bare_host_gets_default_port() {
        let e = Endpoint::parse("example.com").unwrap();
        assert_eq!(e, Endpoint::new("example.com", Some(443)));
        assert_eq!(e.key(), "example.com:443");
    }

    #[test]
    fn explicit_port_is_kept() {
        let e = Endpoint::parse("example.com:5512").unwrap();
        assert_eq!(e.port, 5512);
        assert_eq!(e.to_string(), "example.com:5512");
    }

    #[test]
    fn reject_malformed_endpoints() {
        assert!(matches!(Endpoint::parse(""), Err(EndpointParseError::MissingHost)));
        assert!(matches!(Endpoint::parse(":443"), Err(EndpointParseError::MissingHost)));
        assert!(matches!(Endpoint::parse("a.com:"), Err(EndpointParseError::MissingPort(_))));
        assert!(matches!(Endpoint::parse("a.com:0"), Err(EndpointParseError::InvalidPort(_))));
        assert!(matches!(Endpoint::parse("a.com:https"), Err(EndpointParseError::InvalidPort(_))));
        assert!(matches!(Endpoint::parse("a.com:1:2"), Err(EndpointParseError::Malformed(_))));
    }

    #[test]
    fn keys_distinguish_ports() {
        let a = Endpoint::new("a.com", None);
        let b = Endpoint::new("a.com", Some(8443));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn wildcard_hosts_are_dialed_as_www() {
        let e = Endpoint::new("*.example.com", None);
        assert_eq!(e.dial_host(), "www.example.com");
        assert_eq!(e.key(), "*.example.com:443");
    }

    #[test]
    fn hosts_of_empty_binding() {
        let b = TlsBinding::default();
        assert!(b.hosts().is_empty());
    }
}
