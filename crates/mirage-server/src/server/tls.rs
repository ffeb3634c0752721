//! TLS termination for the secure listener.
//!
//! Certificates are resolved per target host identity through a cache in
//! front of a [`CertificateIssuer`] seam, so issued key material is created
//! once and owned for the process lifetime. The default issuer presents the
//! configured CA-signed material; generation internals live behind the trait.

use parking_lot::RwLock;
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::CertificateDer;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

/// Produces the certificate presented for a target host identity.
pub trait CertificateIssuer: Send + Sync {
    fn issue(&self, host: &str) -> Result<Arc<CertifiedKey>, anyhow::Error>;
}

/// Issuer backed by PEM files: one certificate chain and key, presented for
/// every host.
pub struct FileCertificateIssuer {
    certified: Arc<CertifiedKey>,
}

impl FileCertificateIssuer {
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, anyhow::Error> {
        let cert_file = std::fs::File::open(cert_path)
            .map_err(|e| anyhow::anyhow!("Failed to open certificate file '{cert_path}': {e}"))?;
        let mut cert_reader = std::io::BufReader::new(cert_file);
        let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate file: {e}"))?;
        if certs.is_empty() {
            anyhow::bail!("No certificates found in certificate file: {cert_path}");
        }

        let key_file = std::fs::File::open(key_path)
            .map_err(|e| anyhow::anyhow!("Failed to open private key file '{key_path}': {e}"))?;
        let mut key_reader = std::io::BufReader::new(key_file);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key file: {e}"))?
            .ok_or_else(|| anyhow::anyhow!("No private key found in key file: {key_path}"))?;

        let signing_key = any_supported_type(&key)
            .map_err(|e| anyhow::anyhow!("Unsupported private key type: {e}"))?;

        Ok(Self {
            certified: Arc::new(CertifiedKey::new(certs, signing_key)),
        })
    }
}

impl CertificateIssuer for FileCertificateIssuer {
    fn issue(&self, _host: &str) -> Result<Arc<CertifiedKey>, anyhow::Error> {
        Ok(Arc::clone(&self.certified))
    }
}

/// Cache of issued certificates keyed by target host identity.
pub struct CertificateCache {
    issuer: Arc<dyn CertificateIssuer>,
    issued: RwLock<HashMap<String, Arc<CertifiedKey>>>,
}

/// Cache key for connections that present no server name.
const NO_SNI: &str = "";

impl CertificateCache {
    pub fn new(issuer: Arc<dyn CertificateIssuer>) -> Self {
        Self {
            issuer,
            issued: RwLock::new(HashMap::new()),
        }
    }

    /// One issuance per host; later lookups reuse the cached material.
    pub fn certificate_for(&self, host: &str) -> Option<Arc<CertifiedKey>> {
        if let Some(certified) = self.issued.read().get(host) {
            return Some(Arc::clone(certified));
        }
        match self.issuer.issue(host) {
            Ok(certified) => {
                debug!(host, "issued certificate");
                self.issued
                    .write()
                    .insert(host.to_string(), Arc::clone(&certified));
                Some(certified)
            }
            Err(e) => {
                tracing::warn!(host, "certificate issuance failed: {e}");
                None
            }
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued.read().len()
    }
}

impl fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateCache")
            .field("issued", &self.issued_count())
            .finish()
    }
}

impl ResolvesServerCert for CertificateCache {
    fn resolve(&self, client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        let host = client_hello.server_name().unwrap_or(NO_SNI).to_string();
        self.certificate_for(&host)
    }
}

/// TLS acceptor resolving its certificate per connection through the cache.
pub fn create_tls_acceptor(cache: Arc<CertificateCache>) -> TlsAcceptor {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(cache);
    TlsAcceptor::from(Arc::new(config))
}
