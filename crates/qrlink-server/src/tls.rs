//! TLS support for the qrlink server
//!
//! Self-signed certificate generation with persistent storage and
//! fingerprint reporting, so viewers can verify the server they pair with.

use axum_server::tls_rustls::RustlsConfig;
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Certificate validity period (1 year)
const CERT_VALIDITY_DAYS: i64 = 365;

/// Regenerate when less than this many days remain
const CERT_RENEWAL_THRESHOLD_DAYS: i64 = 30;

/// TLS errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("certificate generation error: {0}")]
    Cert(#[from] rcgen::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration directory not found")]
    NoConfigDir,
}

pub type TlsResult<T> = Result<T, TlsError>;

/// Certificate manager with persistent storage and renewal
pub struct CertificateManager {
    /// Directory holding the certificate, key, and metadata files
    config_dir: PathBuf,
}

impl CertificateManager {
    /// Create a manager using the default config directory (~/.config/qrlink)
    pub fn new() -> TlsResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or(TlsError::NoConfigDir)?
            .join("qrlink");
        Self::with_dir(config_dir)
    }

    /// Create a manager with a custom config directory
    pub fn with_dir(config_dir: PathBuf) -> TlsResult<Self> {
        std::fs::create_dir_all(&config_dir)?;
        Ok(Self { config_dir })
    }

    /// Get the certificate file path
    pub fn cert_path(&self) -> PathBuf {
        self.config_dir.join("server.crt")
    }

    /// Get the private key file path
    pub fn key_path(&self) -> PathBuf {
        self.config_dir.join("server.key")
    }

    fn metadata_path(&self) -> PathBuf {
        self.config_dir.join("cert_meta.json")
    }

    /// Load the stored certificate, or generate a fresh one
    ///
    /// A stored certificate is reused while it matches the requested
    /// hostnames and is not close to expiry. Returns the certificate PEM,
    /// key PEM, and fingerprint.
    pub fn load_or_generate(&self, hostnames: &[String]) -> TlsResult<(String, String, String)> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();

        if cert_path.exists() && key_path.exists() {
            if let Some(meta) = self.load_metadata() {
                if self.is_certificate_usable(&meta, hostnames) {
                    info!("Loading existing certificate (expires {})", meta.expires_at);
                    let cert_pem = std::fs::read_to_string(&cert_path)?;
                    let key_pem = std::fs::read_to_string(&key_path)?;
                    return Ok((cert_pem, key_pem, meta.fingerprint));
                }
                info!("Certificate needs regeneration");
            }
        }

        info!("Generating new self-signed certificate...");
        let (cert_pem, key_pem) = generate_self_signed_cert(hostnames)?;
        let fingerprint = calculate_cert_fingerprint(&cert_pem);

        std::fs::write(&cert_path, &cert_pem)?;
        std::fs::write(&key_path, &key_pem)?;

        let meta = CertMetadata {
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(CERT_VALIDITY_DAYS),
            fingerprint: fingerprint.clone(),
            hostnames: hostnames.to_vec(),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        std::fs::write(self.metadata_path(), json)?;

        info!("Certificate saved to {:?}", cert_path);
        info!("Certificate fingerprint: {}", fingerprint);

        Ok((cert_pem, key_pem, fingerprint))
    }

    /// Whether the stored certificate still covers the requested hostnames
    /// and is not inside the renewal window
    fn is_certificate_usable(&self, meta: &CertMetadata, hostnames: &[String]) -> bool {
        if meta.expires_at - Utc::now() < Duration::days(CERT_RENEWAL_THRESHOLD_DAYS) {
            debug!("Certificate expiring soon");
            return false;
        }

        let mut current: Vec<String> = hostnames.to_vec();
        let mut stored: Vec<String> = meta.hostnames.clone();
        current.sort();
        stored.sort();

        if current != stored {
            debug!("Hostnames changed, regenerating certificate");
            return false;
        }

        true
    }

    fn load_metadata(&self) -> Option<CertMetadata> {
        let contents = std::fs::read_to_string(self.metadata_path()).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

/// Certificate metadata for persistence
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CertMetadata {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    fingerprint: String,
    hostnames: Vec<String>,
}

/// Generate a self-signed certificate for the given hostnames/IPs
pub fn generate_self_signed_cert(hostnames: &[String]) -> TlsResult<(String, String)> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "qrlink");
    dn.push(DnType::OrganizationName, "qrlink");
    params.distinguished_name = dn;

    let mut san_list = Vec::new();
    san_list.push(SanType::DnsName("localhost".try_into()?));

    for hostname in hostnames {
        if let Ok(ip) = hostname.parse::<std::net::IpAddr>() {
            san_list.push(SanType::IpAddress(ip));
        } else if let Ok(dns) = hostname.as_str().try_into() {
            san_list.push(SanType::DnsName(dns));
        }
    }

    san_list.push(SanType::IpAddress(std::net::IpAddr::V4(
        std::net::Ipv4Addr::new(127, 0, 0, 1),
    )));

    params.subject_alt_names = san_list;

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// Calculate the SHA-256 fingerprint of a certificate in the
/// colon-separated form browsers display
pub fn calculate_cert_fingerprint(cert_pem: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert_pem.as_bytes());
    let result = hasher.finalize();

    result
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Create a RustlsConfig from PEM strings
pub async fn create_rustls_config(cert_pem: &str, key_pem: &str) -> TlsResult<RustlsConfig> {
    let config =
        RustlsConfig::from_pem(cert_pem.as_bytes().to_vec(), key_pem.as_bytes().to_vec()).await?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cert_generation() {
        let hostnames = vec!["192.168.1.100".to_string()];
        let (cert, key) = generate_self_signed_cert(&hostnames).unwrap();
        assert!(cert.contains("BEGIN CERTIFICATE"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_fingerprint_calculation() {
        let cert = "-----BEGIN CERTIFICATE-----\ntest\n-----END CERTIFICATE-----";
        let fp = calculate_cert_fingerprint(cert);
        assert!(fp.contains(':'));
        assert_eq!(fp.len(), 95); // 32 bytes * 2 hex + 31 colons
    }

    #[test]
    fn test_certificate_manager_reuse_and_renewal() {
        let dir = tempdir().unwrap();
        let manager = CertificateManager::with_dir(dir.path().to_path_buf()).unwrap();

        let hostnames = vec!["localhost".to_string(), "192.168.1.1".to_string()];

        // First call generates
        let (cert1, key1, fp1) = manager.load_or_generate(&hostnames).unwrap();
        assert!(!fp1.is_empty());

        // Second call loads the stored certificate
        let (cert2, key2, fp2) = manager.load_or_generate(&hostnames).unwrap();
        assert_eq!(cert1, cert2);
        assert_eq!(key1, key2);
        assert_eq!(fp1, fp2);

        // Changed hostnames trigger regeneration
        let new_hostnames = vec!["localhost".to_string(), "10.0.0.1".to_string()];
        let (cert3, _, fp3) = manager.load_or_generate(&new_hostnames).unwrap();
        assert_ne!(cert1, cert3);
        assert_ne!(fp1, fp3);
    }
}
