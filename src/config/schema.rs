use serde::{Deserialize, Serialize};

/// Top-level service configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub password: PasswordConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Whole-request timeout; slow clients get 408.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_bytes: 65_536,
        }
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// 32-byte key file. Created on first start when missing; when unset a
    /// random key is used and sessions do not survive a restart.
    pub key_file: Option<String>,
    pub max_age_secs: u64,
    /// Add the `Secure` attribute (serve over HTTPS only).
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "user-session".into(),
            key_file: None,
            max_age_secs: 30 * 24 * 3600,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Credential store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database path; defaults to the platform data directory.
    pub database_path: Option<String>,
    /// Upper bound on a single store call.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: None,
            timeout_ms: 5_000,
        }
    }
}

/// Password hashing cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// PBKDF2-HMAC-SHA256 rounds for newly hashed passwords.
    pub iterations: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            iterations: 100_000,
        }
    }
}
