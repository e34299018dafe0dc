//! AES-256-GCM sealing for client-held session state.
//!
//! Sealed values are opaque to the client and tamper-evident: any change to
//! the nonce, ciphertext or associated data makes `open` fail.
//!
//! ## Format
//! `v1.<base64url(nonce || ciphertext)>`, no padding, safe inside a cookie.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::path::Path;

/// Key size for AES-256 (32 bytes / 256 bits).
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-256-GCM (12 bytes / 96 bits).
const AES_GCM_NONCE_SIZE: usize = 12;

/// Version prefix for sealed values.
const SEALED_PREFIX: &str = "v1.";

/// AES-256-GCM encryption engine.
#[derive(Clone)]
pub struct AesEncryptor {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for AesEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesEncryptor").finish_non_exhaustive()
    }
}

impl AesEncryptor {
    /// Create a new encryptor with a 256-bit key.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create an encryptor with a fresh random key that lives only in memory.
    pub fn ephemeral() -> Self {
        Self { key: random_key() }
    }

    /// Create an encryptor by loading the key from a file.
    pub fn from_key_file(path: &Path) -> anyhow::Result<Self> {
        let key_bytes = std::fs::read(path)?;
        if key_bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "Session key must be exactly {KEY_SIZE} bytes, got {} ({})",
                key_bytes.len(),
                path.display()
            );
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&key_bytes);
        Ok(Self { key })
    }

    /// Generate a new random key and save it to a file (owner-only on unix).
    pub fn generate_key_file(path: &Path) -> anyhow::Result<Self> {
        let key = random_key();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, key)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self { key })
    }

    /// Load the key file if it exists, otherwise generate it.
    pub fn load_or_generate(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_key_file(path)
        } else {
            tracing::info!(path = %path.display(), "Generating new session key file");
            Self::generate_key_file(path)
        }
    }

    /// Seal `plaintext` bound to `aad`, returning the prefixed base64url string.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> anyhow::Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow::anyhow!("AES cipher init failed: {e}"))?;

        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("AES encryption failed: {e}"))?;

        let mut combined = Vec::with_capacity(AES_GCM_NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{SEALED_PREFIX}{}", URL_SAFE_NO_PAD.encode(&combined)))
    }

    /// Open a value produced by [`AesEncryptor::seal`] with the same `aad`.
    pub fn open(&self, sealed: &str, aad: &[u8]) -> anyhow::Result<Vec<u8>> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| anyhow::anyhow!("Missing sealed value prefix"))?;

        let combined = URL_SAFE_NO_PAD.decode(encoded)?;
        if combined.len() < AES_GCM_NONCE_SIZE {
            anyhow::bail!("Ciphertext too short");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(AES_GCM_NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow::anyhow!("AES cipher init failed: {e}"))?;

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("AES decryption failed: {e}"))
    }

    /// Check if a string carries the sealed value prefix.
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }
}

fn random_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}
