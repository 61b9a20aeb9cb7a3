use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

/// Certificate and key locations for `fitlog serve --tls`.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Explicit paths win; anything missing defaults into `tls_dir`.
    pub fn resolve(tls_dir: &Path, cert: Option<PathBuf>, key: Option<PathBuf>) -> Result<Self> {
        if cert.is_none() || key.is_none() {
            std::fs::create_dir_all(tls_dir).with_context(|| {
                format!("Failed to create TLS directory: {}", tls_dir.display())
            })?;
        }
        Ok(Self {
            cert_path: cert.unwrap_or_else(|| tls_dir.join("cert.pem")),
            key_path: key.unwrap_or_else(|| tls_dir.join("key.pem")),
        })
    }

    /// Make sure both files exist, generating a self-signed pair if either
    /// is missing. Returns the certificate's SHA-256 fingerprint.
    pub fn ensure(&self) -> Result<String> {
        if self.cert_path.exists() && self.key_path.exists() {
            return fingerprint_from_pem_file(&self.cert_path);
        }
        info!(path = %self.cert_path.display(), "generating self-signed TLS certificate");
        generate_self_signed_cert(&self.cert_path, &self.key_path)
    }
}

fn generate_self_signed_cert(cert_path: &Path, key_path: &Path) -> Result<String> {
    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .context("failed to create certificate params")?;
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "fitlog sync server");
    params
        .subject_alt_names
        .push(rcgen::SanType::IpAddress(std::net::IpAddr::V4(
            std::net::Ipv4Addr::LOCALHOST,
        )));

    let key_pair = rcgen::KeyPair::generate().context("failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("failed to generate self-signed certificate")?;

    std::fs::write(cert_path, cert.pem())
        .with_context(|| format!("Failed to write certificate to {}", cert_path.display()))?;
    std::fs::write(key_path, key_pair.serialize_pem())
        .with_context(|| format!("Failed to write private key to {}", key_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set private key permissions")?;
    }

    Ok(sha256_fingerprint(cert.der()))
}

fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn fingerprint_from_pem_file(cert_path: &Path) -> Result<String> {
    let pem_data = std::fs::read(cert_path)
        .with_context(|| format!("Failed to read certificate from {}", cert_path.display()))?;
    let mut reader = std::io::BufReader::new(pem_data.as_slice());
    let certs: Vec<_> =
        rustls_pemfile::certs(&mut reader).collect::<std::result::Result<_, _>>()?;
    let cert = certs.first().context("No certificate found in PEM file")?;
    Ok(sha256_fingerprint(cert.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_into_tls_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("tls");
        let tls = TlsConfig::resolve(&dir, None, None).unwrap();
        assert!(dir.is_dir());
        assert_eq!(tls.cert_path, dir.join("cert.pem"));
        assert_eq!(tls.key_path, dir.join("key.pem"));

        let custom = TlsConfig::resolve(&dir, Some(tmp.path().join("c.pem")), None).unwrap();
        assert_eq!(custom.cert_path, tmp.path().join("c.pem"));
        assert_eq!(custom.key_path, dir.join("key.pem"));
    }

    #[test]
    fn test_ensure_generates_then_reuses() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tls = TlsConfig::resolve(tmp.path(), None, None).unwrap();

        let first = tls.ensure().unwrap();
        assert!(std::fs::read_to_string(&tls.cert_path)
            .unwrap()
            .contains("BEGIN CERTIFICATE"));
        assert!(std::fs::read_to_string(&tls.key_path)
            .unwrap()
            .contains("BEGIN PRIVATE KEY"));

        let second = tls.ensure().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tls = TlsConfig::resolve(tmp.path(), None, None).unwrap();
        let fingerprint = tls.ensure().unwrap();

        let parts: Vec<&str> = fingerprint.split(':').collect();
        assert_eq!(parts.len(), 32);
        assert!(parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit())));
    }
}
