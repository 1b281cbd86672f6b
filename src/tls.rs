//! TLS server configuration from PEM certificate and key files.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// Build a rustls `ServerConfig` from PEM certificate and key file paths.
pub fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<rustls::ServerConfig>> {
    let cert_pem = fs::read(cert_path)
        .with_context(|| format!("read certificate file {}", cert_path))?;
    let key_pem = fs::read(key_path).with_context(|| format!("read key file {}", key_path))?;
    let certs = parse_certs(&cert_pem).with_context(|| format!("certificate file {}", cert_path))?;
    let key = parse_private_key(&key_pem).with_context(|| format!("key file {}", key_path))?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("assemble TLS server config")?;
    Ok(Arc::new(config))
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .context("parse PEM certificates")?;
    anyhow::ensure!(!certs.is_empty(), "no certificates in PEM data");
    Ok(certs)
}

/// The key may be PKCS#8 or PKCS#1; try both against the same bytes.
fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut &pem[..]).next() {
        return Ok(key.context("parse PKCS8 private key")?.into());
    }
    if let Some(key) = rustls_pemfile::rsa_private_keys(&mut &pem[..]).next() {
        return Ok(key.context("parse RSA private key")?.into());
    }
    anyhow::bail!("no private key in PEM data");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fail() {
        assert!(load_server_config("/nonexistent/cert.pem", "/nonexistent/key.pem").is_err());
    }

    #[test]
    fn test_no_certs_in_pem() {
        assert!(parse_certs(b"").is_err());
        assert!(parse_certs(b"not pem at all").is_err());
    }

    #[test]
    fn test_no_key_in_pem() {
        let err = parse_private_key(b"-----BEGIN GARBAGE-----\n-----END GARBAGE-----\n")
            .unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }
}
