//! Configuration loading.
//!
//! Resolution order: built-in defaults, then the TOML file (`--config` or
//! `<platform config dir>/config.toml`), then `SESSIONGATE_*` environment
//! variables.

mod schema;

pub use schema::{
    Config, GatewayConfig, PasswordConfig, SessionConfig, StoreBackend, StoreConfig,
};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PASSWORD_ITERATIONS: u32 = 1_000;

const ENV_HOST: &str = "SESSIONGATE_HOST";
const ENV_PORT: &str = "SESSIONGATE_PORT";
const ENV_DATABASE: &str = "SESSIONGATE_DATABASE";
const ENV_KEY_FILE: &str = "SESSIONGATE_KEY_FILE";
const ENV_SECURE_COOKIE: &str = "SESSIONGATE_SECURE_COOKIE";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "sessiongate")
}

/// Default config file location, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

impl Config {
    /// Load configuration from `path` (or the default location) and the
    /// process environment. A missing default file yields defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `SESSIONGATE_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.gateway.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PORT} must be a port number, got {port:?}"))?;
        }
        if let Some(db) = lookup(ENV_DATABASE) {
            self.store.database_path = Some(db);
        }
        if let Some(key_file) = lookup(ENV_KEY_FILE) {
            self.session.key_file = Some(key_file);
        }
        if let Some(secure) = lookup(ENV_SECURE_COOKIE) {
            self.session.secure = matches!(
                secure.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            bail!("gateway.port must be non-zero");
        }
        let name = &self.session.cookie_name;
        if name.is_empty() {
            bail!("session.cookie_name must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            bail!("session.cookie_name {name:?} contains characters not allowed in a cookie name");
        }
        if self.password.iterations < MIN_PASSWORD_ITERATIONS {
            bail!(
                "password.iterations must be at least {MIN_PASSWORD_ITERATIONS}, got {}",
                self.password.iterations
            );
        }
        if self.store.timeout_ms == 0 {
            bail!("store.timeout_ms must be non-zero");
        }
        Ok(())
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.store.database_path {
            Some(raw) => expand_path(raw),
            None => project_dirs()
                .map(|dirs| dirs.data_dir().join("users.db"))
                .unwrap_or_else(|| PathBuf::from("users.db")),
        }
    }

    /// Resolved session key file, if configured.
    pub fn key_file_path(&self) -> Option<PathBuf> {
        self.session.key_file.as_deref().map(expand_path)
    }
}
