//! First-contact certificate capture used for trust pinning.

use crate::errors::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

const HTTPS_PORT: u16 = 443;

/// Accepts any server certificate. Only used for the capture handshake,
/// never for requests that carry credentials.
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Performs one TLS handshake and returns the leaf certificate the server offered.
pub async fn fetch_peer_certificate(host: &str, port: u16) -> Result<CertificateDer<'static>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();

    let server_name =
        ServerName::try_from(host.to_string()).map_err(|e| Error::Tls(e.to_string()))?;

    debug!("Capturing certificate from {}:{}", host, port);
    let stream = TcpStream::connect((host, port)).await?;
    let tls = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(format!("SSL handshake failed: {}", e)))?;

    let (_, connection) = tls.get_ref();
    connection
        .peer_certificates()
        .and_then(|certificates| certificates.first())
        .map(|certificate| certificate.clone().into_owned())
        .ok_or_else(|| Error::Tls(format!("{} offered no certificate", host)))
}

/// Extracts host and port from an `https://host[:port][/path]` URL.
pub fn host_and_port(url: &str) -> Result<(String, u16)> {
    let authority = url
        .strip_prefix("https://")
        .ok_or_else(|| Error::Tls(format!("not an https URL: {}", url)))?
        .split('/')
        .next()
        .unwrap_or_default();

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::Tls(format!("invalid port in {}", url)))?;
            (host, port)
        }
        None => (authority, HTTPS_PORT),
    };

    if host.is_empty() {
        return Err(Error::Tls(format!("missing host in {}", url)));
    }

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_and_port() {
        assert_eq!(
            host_and_port("https://fmipmobile.icloud.com").unwrap(),
            ("fmipmobile.icloud.com".to_string(), 443)
        );
        assert_eq!(
            host_and_port("https://localhost:8443/base").unwrap(),
            ("localhost".to_string(), 8443)
        );
    }

    #[test]
    fn test_host_and_port_rejects_bad_urls() {
        assert!(host_and_port("http://example.com").is_err());
        assert!(host_and_port("https://").is_err());
        assert!(host_and_port("https://example.com:port").is_err());
    }
}
