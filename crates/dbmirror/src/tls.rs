//! TLS setup for connection tests.
//!
//! Hosted databases require TLS; local containers do not speak it. The
//! `sslmode` query parameter wins when present.

use std::sync::Arc;

use rustls::crypto::ring;
use rustls::ClientConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::debug;

use crate::endpoint::DatabaseEndpoint;
use crate::error::{MirrorError, Result};

/// libpq-style `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    /// Encrypt without verifying the server certificate.
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "require" | "prefer" | "allow" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MirrorError::Config(format!(
                "Invalid sslmode '{}'. Valid values: disable, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    /// Mode for an endpoint: explicit `sslmode`, else off for loopback and
    /// `require` for everything remote.
    pub fn for_endpoint(endpoint: &DatabaseEndpoint) -> Result<Self> {
        match endpoint.query_param("sslmode") {
            Some(mode) => Self::parse(&mode),
            None if endpoint.is_loopback() => Ok(SslMode::Disable),
            None => Ok(SslMode::Require),
        }
    }

    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

/// rustls connector for `tokio-postgres`, `None` when TLS is off.
pub fn make_connector(mode: SslMode) -> Result<Option<MakeRustlsConnect>> {
    if !mode.requires_tls() {
        return Ok(None);
    }

    // ring, regardless of the process-wide default provider.
    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| MirrorError::Config(format!("TLS setup failed: {}", e)))?;

    let config = match mode {
        SslMode::Require => {
            debug!("sslmode=require: server certificate is not verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
                .with_no_client_auth()
        }
        _ => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    };

    Ok(Some(MakeRustlsConnect::new(config)))
}

/// Verifier for `sslmode=require`: encryption without authentication.
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
