//! TLS configuration for the HTTPS listener.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};

use crate::Error;

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Load a certificate chain and private key from PEM files.
    ///
    /// # Arguments
    ///
    /// * `cert_path` - leaf certificate (optionally followed by intermediates)
    /// * `key_path` - PKCS#8, PKCS#1 or SEC1 private key
    /// * `ca_path` - optional bundle appended to the served chain
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        ca_path: Option<&Path>,
    ) -> Result<Self, Error> {
        let mut chain = read_certs(open(cert_path.as_ref())?)?;
        if let Some(ca) = ca_path {
            chain.extend(read_certs(open(ca)?)?);
        }
        let key = read_key(open(key_path.as_ref())?)?;
        Self::from_parts(chain, key)
    }

    /// Same as [`TlsConfig::from_pem_files`] with in-memory PEM data.
    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, Error> {
        let chain = read_certs(BufReader::new(cert_pem))?;
        let key = read_key(BufReader::new(key_pem))?;
        Self::from_parts(chain, key)
    }

    fn from_parts(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, Error> {
        if chain.is_empty() {
            return Err(Error::Tls("no certificates found".to_string()));
        }
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("unsupported protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| Error::Tls(format!("invalid certificate or key: {}", e)))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(config),
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::Tls(format!("cannot open {}: {}", path.display(), e)))
}

fn read_certs(mut reader: impl std::io::BufRead) -> Result<Vec<CertificateDer<'static>>, Error> {
    certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse certificates: {}", e)))
}

fn read_key(mut reader: impl std::io::BufRead) -> Result<PrivateKeyDer<'static>, Error> {
    private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("failed to read private key: {}", e)))?
        .ok_or_else(|| Error::Tls("no private key found".to_string()))
}
