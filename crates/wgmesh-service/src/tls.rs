//! TLS material loading for the mesh RPC.
//!
//! Secure mode requires a server key and certificate plus either a CA
//! certificate file or a directory of CA certificates; client certificates
//! are required (mutual TLS). Dev mode serves plaintext and never touches
//! this module.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tracing::debug;
use wgmesh_core::TlsServerConfig;

use crate::error::{Result, ServiceError};

/// Build the rustls server configuration for mutual TLS.
pub fn server_config(tls: &TlsServerConfig) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(Path::new(&tls.server_cert))?;
    let key = load_key(Path::new(&tls.server_key))?;

    let mut roots = RootCertStore::empty();
    if !tls.ca_cert.is_empty() {
        add_ca_file(&mut roots, Path::new(&tls.ca_cert))?;
    } else {
        add_ca_dir(&mut roots, Path::new(&tls.ca_path))?;
    }
    if roots.is_empty() {
        return Err(ServiceError::Tls(
            "no usable CA certificates found".to_string(),
        ));
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ServiceError::Tls(format!("client verifier: {e}")))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ServiceError::Tls(format!("server certificate: {e}")))?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| ServiceError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| ServiceError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ServiceError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| ServiceError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServiceError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| ServiceError::Tls(format!("{}: no private key found", path.display())))
}

fn add_ca_file(roots: &mut RootCertStore, path: &Path) -> Result<()> {
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| ServiceError::Tls(format!("{}: {e}", path.display())))?;
    }
    debug!(cafile = %path.display(), "added CA certificates");
    Ok(())
}

fn add_ca_dir(roots: &mut RootCertStore, dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ServiceError::Tls(format!("{}: {e}", dir.display())))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        // skip unreadable or non-PEM files instead of failing the whole dir
        if let Ok(certs) = load_certs(&path) {
            for cert in certs {
                if roots.add(cert).is_ok() {
                    debug!(cafile = %path.display(), "added CA certificate");
                }
            }
        }
    }
    Ok(())
}
