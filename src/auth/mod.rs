//! User authentication.
//!
//! Provides:
//! - Credential storage (SQLite or in-memory) with atomic username uniqueness
//! - Salted PBKDF2-HMAC-SHA256 password hashing
//! - The sign-up / log-in / welcome / log-out state machine over sessions
//!
//! ## Design Decisions
//! - Collaborators are injected as trait objects so tests can swap in fakes.
//! - Store and hash calls are blocking and run on tokio's blocking pool;
//!   store calls are bounded by a timeout.
//! - Log-in failures collapse into one error so responses never reveal
//!   whether a username exists.

pub mod error;
pub mod machine;
pub mod password;
pub mod store;

pub use error::AuthError;
pub use machine::{Authenticator, Credentials, Transition};
pub use password::{PasswordHasher, Pbkdf2Hasher};
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore, StoreError};
