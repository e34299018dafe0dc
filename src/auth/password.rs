//! Password hashing.
//!
//! Digests are self-describing so the iteration count can be raised without
//! invalidating stored hashes:
//!
//! `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`

use crate::security::constant_time_eq;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use anyhow::{bail, Result};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Derived key length (one SHA-256 block).
const HASH_BYTES: usize = 32;

const SCHEME: &str = "pbkdf2-sha256";

/// One-way, salted password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash `password` with a fresh salt.
    fn hash(&self, password: &str) -> Result<String>;

    /// Check `password` against a digest produced by [`PasswordHasher::hash`].
    /// Malformed digests never verify.
    fn verify(&self, digest: &str, password: &str) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a per-password random salt.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let derived = derive(password, &salt, self.iterations);
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(derived)
        ))
    }

    fn verify(&self, digest: &str, password: &str) -> bool {
        match parse_digest(digest) {
            Ok((iterations, salt, expected)) => {
                let derived = derive(password, &salt, iterations);
                constant_time_eq(&derived, &expected)
            }
            Err(e) => {
                tracing::warn!("Stored password digest is unreadable: {e}");
                false
            }
        }
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn parse_digest(digest: &str) -> Result<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = digest.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        bail!("expected 4 '$'-separated fields");
    };
    if scheme != SCHEME {
        bail!("unsupported scheme {scheme:?}");
    }
    let iterations: u32 = iterations.parse()?;
    if iterations == 0 {
        bail!("iteration count is zero");
    }
    let salt = hex::decode(salt)?;
    let hash = hex::decode(hash)?;
    if hash.len() != HASH_BYTES {
        bail!("hash has {} bytes, expected {HASH_BYTES}", hash.len());
    }
    Ok((iterations, salt, hash))
}
