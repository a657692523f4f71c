//! TLS support for node-to-node and client connections
//!
//! Servers terminate TLS when a certificate and key are configured. Clients
//! dialing with `secure` verify the server against a configured CA bundle, or
//! the webpki root set when none is given.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TlsConfig;
use crate::error::{Error, Result};

/// Build a TLS acceptor if the config enables server-side TLS
pub fn build_acceptor(config: &TlsConfig) -> Result<Option<TlsAcceptor>> {
    let (cert_file, key_file) = match (&config.cert_file, &config.key_file) {
        (Some(cert), Some(key)) => (cert, key),
        _ => return Ok(None),
    };

    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(format!("Failed to build server config: {}", e)))?;

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

/// Build a TLS connector trusting `ca_file`, or the webpki roots
pub fn build_connector(ca_file: Option<&Path>) -> Result<TlsConnector> {
    let mut root_store = RootCertStore::empty();
    match ca_file {
        Some(path) => {
            for cert in load_certs(path)? {
                root_store
                    .add(cert)
                    .map_err(|e| Error::Tls(format!("Failed to add CA certificate: {}", e)))?;
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Server name to verify for a `host:port` address
pub fn server_name(address: &str) -> Result<ServerName<'static>> {
    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("invalid TLS server name {}: {}", host, e)))
}

/// Load certificates from a PEM file
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("No certificates found in {}", path.display())));
    }

    Ok(certs)
}

/// Load the first private key from a PEM file
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("Failed to parse key from {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::Tls(format!("No private key found in {}", path.display())))
}
