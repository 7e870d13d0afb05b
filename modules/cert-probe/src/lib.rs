//! Certificate retrieval over TLS, leaf-certificate inspection and expiry
//! classification.
//!
//! Chain-of-trust verification is disabled; self-signed and privately issued
//! certificates are read like any other.

pub mod classify;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;
use certmon_core::{CertificateSnapshot, ConnectError, Endpoint};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

pub use classify::classify;
pub use snapshot::snapshot_from_chain;

/// Peer certificates, leaf first.
pub type CertificateChain = Vec<CertificateDer<'static>>;

#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<CertificateChain, ConnectError>;
}

/// Dials endpoints over TCP and performs a TLS handshake to read the peer chain.
pub struct TlsProber {
    connector: TlsConnector,
    dial_timeout: Duration,
}

impl TlsProber {
    pub fn new(dial_timeout: Duration) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();
        Ok(TlsProber { connector: TlsConnector::from(Arc::new(config)), dial_timeout })
    }
}

#[async_trait]
impl CertificateFetcher for TlsProber {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<CertificateChain, ConnectError> {
        let host = endpoint.dial_host();
        let server_name = match host.parse::<std::net::IpAddr>() {
            Ok(ip) => ServerName::IpAddress(ip.into()),
            Err(_) => ServerName::try_from(host.clone()).map_err(|_| ConnectError::new(endpoint, "invalid server name"))?,
        };
        let dial = async {
            let stream = TcpStream::connect((host.as_str(), endpoint.port)).await?;
            self.connector.connect(server_name, stream).await
        };
        let tls = timeout(self.dial_timeout, dial)
            .await
            .map_err(|_| ConnectError::new(endpoint, format!("dial timed out after {:?}", self.dial_timeout)))?
            .map_err(|e| ConnectError::new(endpoint, e))?;
        let chain: CertificateChain = tls.get_ref().1.peer_certificates().map(|c| c.to_vec()).unwrap_or_default();
        drop(tls);
        if chain.is_empty() {
            return Err(ConnectError::new(endpoint, "peer presented no certificates"));
        }
        debug!(host = %endpoint, certificates = chain.len(), "read peer certificates");
        Ok(chain)
    }
}

/// Probe `endpoints` in order and return the snapshot of the first one that
/// presents a readable chain. A binding shares one chain across its endpoints,
/// so the remaining endpoints are not dialed.
pub async fn binding_snapshot(
    fetcher: &dyn CertificateFetcher,
    endpoints: &[Endpoint],
) -> Option<(Endpoint, CertificateSnapshot)> {
    for endpoint in endpoints {
        let chain = match fetcher.fetch(endpoint).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!(host = %endpoint, error = %e, "failed to get certificates");
                continue;
            }
        };
        match snapshot_from_chain(&chain) {
            Ok(snapshot) => return Some((endpoint.clone(), snapshot)),
            Err(e) => warn!(host = %endpoint, error = %e, "unreadable leaf certificate"),
        }
    }
    None
}

#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
