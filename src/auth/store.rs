//! Credential storage: username → password digest.
//!
//! Tables:
//! - `users`: username (primary key), password_hash, created_at
//!
//! Uniqueness is enforced by the store itself. `insert_if_absent` is atomic,
//! so two racing sign-ups for one name end with one row and one `Conflict`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Wait this long on a locked SQLite database before giving up.
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username is already registered")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Durable mapping from username to password digest.
pub trait CredentialStore: Send + Sync {
    /// Store `(username, password_hash)` unless the username exists, in which
    /// case fail with [`StoreError::Conflict`] and change nothing.
    fn insert_if_absent(&self, username: &str, password_hash: &str) -> Result<(), StoreError>;

    /// Look up the digest for `username`.
    fn get(&self, username: &str) -> Result<Option<String>, StoreError>;
}

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the credential database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    /// A private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Count registered users.
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn insert_if_absent(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let now = epoch_secs();
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, password_hash, now as i64],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, username: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT password_hash FROM users WHERE username = ?1",
            rusqlite::params![username],
            |row| row.get(0),
        );

        match row {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store for tests and throwaway deployments.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn insert_if_absent(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        use std::collections::hash_map::Entry;

        match self.users.lock().entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(password_hash.to_string());
                Ok(())
            }
        }
    }

    fn get(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self.users.lock().get(username).cloned())
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────
