//! TLS negotiation policy and client configuration.
//!
//! The client announces a security level in the SSL_NEGOTIATE frame; the
//! server answers `'N'` (stay cleartext) or `'S'` (upgrade). Levels 1 and 3
//! are strict and turn the "wrong" answer into an error. When the upgrade
//! happens it is in-band: the TLS handshake runs over the same socket the
//! cleartext frames used.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use super::error::{HandshakeError, NpsResult};

/// Client TLS preference, sent as a 32-bit value in SSL_NEGOTIATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum SecurityLevel {
    /// Level 0 - prefer cleartext, accept TLS
    #[default]
    PreferredUnsecured = 0,
    /// Level 1 - cleartext only, a TLS demand is an error
    OnlyUnsecured = 1,
    /// Level 2 - prefer TLS, accept cleartext
    PreferredSecured = 2,
    /// Level 3 - TLS only, a cleartext answer is an error
    OnlySecured = 3,
}

impl SecurityLevel {
    /// Wire value for the SSL_NEGOTIATE / SSL_CONNECT body.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Whether a cleartext answer must be rejected.
    pub fn requires_tls(self) -> bool {
        matches!(self, SecurityLevel::OnlySecured)
    }

    /// Whether a TLS demand must be rejected.
    pub fn forbids_tls(self) -> bool {
        matches!(self, SecurityLevel::OnlyUnsecured)
    }
}

/// TLS material and peer-verification policy for the in-band upgrade.
///
/// Peer certificates are verified by default against the bundled webpki
/// roots; a caller-supplied CA bundle replaces them. Setting
/// `reject_unauthorized` to `false` disables verification entirely, for
/// servers with self-signed certificates.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Host name used for SNI and certificate verification
    pub server_name: String,
    /// PEM bundle of trusted CA certificates
    pub ca_path: Option<PathBuf>,
    /// PEM client certificate chain for mutual TLS
    pub client_cert_path: Option<PathBuf>,
    /// PEM client private key for mutual TLS
    pub client_key_path: Option<PathBuf>,
    /// Verify the server certificate (default true)
    pub reject_unauthorized: bool,
}

impl TlsOptions {
    /// Options verifying against the webpki roots for the given host.
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ca_path: None,
            client_cert_path: None,
            client_key_path: None,
            reject_unauthorized: true,
        }
    }

    /// Trust the given CA bundle instead of the webpki roots.
    pub fn with_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    /// Present a client certificate and key during the TLS handshake.
    pub fn with_client_cert(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert.into());
        self.client_key_path = Some(key.into());
        self
    }

    /// Disable server certificate verification.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.reject_unauthorized = false;
        self
    }

    /// The SNI name for the TLS handshake.
    pub(crate) fn server_name(&self) -> NpsResult<ServerName<'static>> {
        ServerName::try_from(self.server_name.clone()).map_err(|_| {
            HandshakeError::TlsConfig(format!("invalid server name: {}", self.server_name))
        })
    }

    /// Build a `tokio_rustls` connector from these options.
    pub(crate) fn connector(&self) -> NpsResult<TlsConnector> {
        let provider = rustls::crypto::ring::default_provider();
        let builder = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| {
                HandshakeError::TlsConfig(format!("failed to set protocol versions: {e}"))
            })?;

        let client_auth = match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certificates(cert_path)?;
                if certs.is_empty() {
                    return Err(HandshakeError::TlsConfig(format!(
                        "no certificates found in {}",
                        cert_path.display()
                    )));
                }
                let key = load_private_key(key_path)?;
                Some((certs, key))
            }
            (None, None) => None,
            _ => {
                return Err(HandshakeError::TlsConfig(
                    "client certificate and key must be provided together".to_string(),
                ))
            }
        };

        let config = if self.reject_unauthorized {
            let roots = self.build_root_store()?;
            let builder = builder.with_root_certificates(roots);
            match client_auth {
                Some((certs, key)) => builder.with_client_auth_cert(certs, key).map_err(|e| {
                    HandshakeError::TlsConfig(format!("invalid client certificate or key: {e}"))
                })?,
                None => builder.with_no_client_auth(),
            }
        } else {
            let builder = builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification));
            match client_auth {
                Some((certs, key)) => builder.with_client_auth_cert(certs, key).map_err(|e| {
                    HandshakeError::TlsConfig(format!("invalid client certificate or key: {e}"))
                })?,
                None => builder.with_no_client_auth(),
            }
        };

        Ok(TlsConnector::from(Arc::new(config)))
    }

    fn build_root_store(&self) -> NpsResult<RootCertStore> {
        let mut roots = RootCertStore::empty();
        match &self.ca_path {
            Some(ca_path) => {
                for cert in load_certificates(ca_path)? {
                    roots.add(cert).map_err(|e| {
                        HandshakeError::TlsConfig(format!(
                            "cannot add CA certificate from {}: {e}",
                            ca_path.display()
                        ))
                    })?;
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }
        Ok(roots)
    }
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self::new("localhost")
    }
}

fn load_certificates(path: &Path) -> NpsResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        HandshakeError::TlsConfig(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| HandshakeError::TlsConfig(format!("cannot parse {}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> NpsResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        HandshakeError::TlsConfig(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| HandshakeError::TlsConfig(format!("cannot parse {}: {e}", path.display())))?
        .ok_or_else(|| {
            HandshakeError::TlsConfig(format!("no private key found in {}", path.display()))
        })
}

/// Certificate verifier that accepts anything, installed when
/// `reject_unauthorized` is `false`.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
