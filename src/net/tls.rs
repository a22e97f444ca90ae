use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

/// Names covered by the development certificate
const SELF_SIGNED_NAMES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// TLS configuration for WebTransport server
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser flag)
    pub cert_hash: String,
}

impl TlsConfig {
    /// PEM files when both paths are configured, otherwise a fresh self-signed identity
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        match (&config.tls_cert_path, &config.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!("Loading TLS certificate from {}", cert_path);
                Self::load_from_paths(cert_path, key_path).await
            }
            _ => {
                info!("No TLS paths configured, generating a self-signed certificate");
                Self::self_signed()
            }
        }
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;
        Ok(Self::from_identity(identity))
    }

    /// Short-lived certificate browsers accept via `serverCertificateHashes`
    pub fn self_signed() -> Result<Self> {
        let identity = Identity::self_signed(SELF_SIGNED_NAMES)
            .context("Failed to generate self-signed certificate")?;
        Ok(Self::from_identity(identity))
    }

    fn from_identity(identity: Identity) -> Self {
        let cert_hash = compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);
        Self {
            identity,
            cert_hash,
        }
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| STANDARD.encode(digest(&SHA256, cert.der()).as_ref()))
        .unwrap_or_default()
}
