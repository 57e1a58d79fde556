//! Mutual TLS for the datanode/SCM and client/SCM RPC surfaces (§6
//! "over TCP with mutual TLS when security is enabled"). Only active when
//! [`TlsConfig`] is configured; `scm-server` otherwise runs in plaintext,
//! matching a dev/test cluster's default.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig, ServerConnection};

use crate::error::{ServerError, ServerResult};
use crate::pem;

/// TLS configuration for the server (§6 "mutual TLS when security is
/// enabled").
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: std::path::PathBuf,
    pub key_path: std::path::PathBuf,
    pub require_client_cert: bool,
    pub ca_cert_path: Option<std::path::PathBuf>,
}

impl TlsConfig {
    pub fn new(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_path_buf(),
            key_path: key_path.as_ref().to_path_buf(),
            require_client_cert: false,
            ca_cert_path: None,
        }
    }

    #[must_use]
    pub fn with_client_auth(mut self, ca_cert_path: impl AsRef<Path>) -> Self {
        self.require_client_cert = true;
        self.ca_cert_path = Some(ca_cert_path.as_ref().to_path_buf());
        self
    }

    pub fn build_server_config(&self) -> ServerResult<Arc<RustlsServerConfig>> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_private_key(&self.key_path)?;

        let builder = RustlsServerConfig::builder();
        let config = if self.require_client_cert {
            let ca_path = self
                .ca_cert_path
                .as_ref()
                .ok_or_else(|| ServerError::Tls("mutual TLS requires a ca_cert_path".to_string()))?;
            let mut roots = RootCertStore::empty();
            for ca_cert in load_certs(ca_path)? {
                roots.add(ca_cert).map_err(|e| ServerError::Tls(e.to_string()))?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| ServerError::Tls(e.to_string()))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .map_err(|e| ServerError::Tls(e.to_string()))?
        } else {
            builder
                .with_no_client_auth()
                .with_single_cert(certs, key)
                .map_err(|e| ServerError::Tls(e.to_string()))?
        };

        Ok(Arc::new(config))
    }
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let pem_data = std::fs::read(path)
        .map_err(|e| ServerError::Tls(format!("failed to read certificate file {}: {e}", path.display())))?;
    let pem_blocks = pem::parse_pem(&pem_data)
        .map_err(|e| ServerError::Tls(format!("failed to parse PEM file {}: {e}", path.display())))?;

    let certs: Vec<CertificateDer<'static>> =
        pem_blocks.into_iter().filter(|block| block.label == "CERTIFICATE").map(|block| CertificateDer::from(block.contents)).collect();

    if certs.is_empty() {
        return Err(ServerError::Tls(format!("no certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let pem_data =
        std::fs::read(path).map_err(|e| ServerError::Tls(format!("failed to read key file {}: {e}", path.display())))?;
    let pem_blocks = pem::parse_pem(&pem_data)
        .map_err(|e| ServerError::Tls(format!("failed to parse PEM file {}: {e}", path.display())))?;

    for block in pem_blocks {
        let key = match block.label.as_str() {
            "PRIVATE KEY" => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(block.contents)),
            "RSA PRIVATE KEY" => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(block.contents)),
            "EC PRIVATE KEY" => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(block.contents)),
            _ => continue,
        };
        return Ok(key);
    }

    Err(ServerError::Tls(format!("no private key found in {}", path.display())))
}

/// A TLS-wrapped stream, driven manually from `mio`'s readable/writable
/// events rather than blocking I/O.
pub struct TlsStream<S> {
    pub socket: S,
    conn: ServerConnection,
}

impl<S: Read + Write> TlsStream<S> {
    pub fn new(socket: S, config: Arc<RustlsServerConfig>) -> ServerResult<Self> {
        let conn =
            ServerConnection::new(config).map_err(|e| ServerError::Tls(format!("failed to create TLS connection: {e}")))?;
        Ok(Self { socket, conn })
    }

    /// Drives the handshake forward one step. Returns `Ok(true)` once
    /// complete.
    pub fn do_handshake(&mut self) -> ServerResult<bool> {
        if self.conn.is_handshaking() {
            while self.conn.wants_write() {
                match self.conn.write_tls(&mut self.socket) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(ServerError::Io(e)),
                }
            }
            if self.conn.wants_read() {
                match self.conn.read_tls(&mut self.socket) {
                    Ok(0) => return Err(ServerError::ConnectionClosed),
                    Ok(_) => {
                        if let Err(e) = self.conn.process_new_packets() {
                            return Err(ServerError::Tls(format!("TLS error: {e}")));
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(ServerError::Io(e)),
                }
            }
        }
        Ok(!self.conn.is_handshaking())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.conn.wants_read() {
            match self.conn.read_tls(&mut self.socket) {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(e) = self.conn.process_new_packets() {
                        return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        self.conn.reader().read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.conn.writer().write(buf)?;
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.socket) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    pub fn wants_read(&self) -> bool {
        self.conn.wants_read()
    }

    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_tracks_client_auth_fields() {
        let config = TlsConfig::new("/path/to/cert.pem", "/path/to/key.pem").with_client_auth("/path/to/ca.pem");
        assert!(config.require_client_cert);
        assert_eq!(config.ca_cert_path.as_ref().and_then(|p| p.to_str()), Some("/path/to/ca.pem"));
    }

    #[test]
    fn missing_cert_file_is_reported_as_a_tls_error() {
        let config = TlsConfig::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(config.build_server_config(), Err(ServerError::Tls(_))));
    }
}
