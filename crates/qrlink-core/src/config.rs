//! Configuration types for qrlink

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the qrlink server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Pairing session validity in seconds
    pub pairing_ttl_secs: i64,
    /// Login token validity in seconds
    pub token_ttl_secs: i64,
    /// HMAC secret for signing bearer tokens
    pub signing_secret: String,
    /// Storage directory override (default: ~/.config/qrlink)
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            pairing_ttl_secs: 300,
            token_ttl_secs: 1800,
            signing_secret: String::new(),
            storage_dir: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set pairing session TTL in seconds
    pub fn with_pairing_ttl(mut self, secs: i64) -> Self {
        self.pairing_ttl_secs = secs;
        self
    }

    /// Builder pattern: set login token TTL in seconds
    pub fn with_token_ttl(mut self, secs: i64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Builder pattern: set the token signing secret
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = secret.into();
        self
    }

    /// Builder pattern: set the storage directory
    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = Some(dir);
        self
    }

    /// Pairing session validity window
    pub fn pairing_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pairing_ttl_secs)
    }

    /// Login token validity window
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs)
    }
}
