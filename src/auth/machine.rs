//! The authentication state machine.
//!
//! Every transition takes the session that was opened for the request and
//! returns the session that should be persisted. Nothing here knows about
//! HTTP; the gateway owns opening and persisting.
//!
//! | Transition | From | To |
//! |---|---|---|
//! | sign-up | any | `Authenticated(u)` |
//! | log-in | any | `Authenticated(u)`, unchanged on failure |
//! | welcome | `Authenticated(u)` | unchanged |
//! | log-out | `Authenticated(u)` | `Anonymous` |

use super::error::AuthError;
use super::password::PasswordHasher;
use super::store::CredentialStore;
use crate::session::Session;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 64;

/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 1024;

/// Username/password pair from a sign-up or log-in body.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check field constraints and return the credentials with the username
    /// trimmed.
    pub fn validated(self) -> Result<Self, AuthError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(AuthError::BadInput("username must not be empty".into()));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AuthError::BadInput(format!(
                "username too long (max {MAX_USERNAME_CHARS} characters)"
            )));
        }
        if username.chars().any(char::is_control) {
            return Err(AuthError::BadInput(
                "username must not contain control characters".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(AuthError::BadInput("password must not be empty".into()));
        }
        if self.password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::BadInput(format!(
                "password too long (max {MAX_PASSWORD_BYTES} bytes)"
            )));
        }
        Ok(Self {
            username: username.to_string(),
            password: self.password,
        })
    }
}

/// Result of a state-changing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Session to persist.
    pub session: Session,
    /// Identity the transition concerned (new user, or the one logged out).
    pub username: String,
}

/// Drives sign-up, log-in, welcome and log-out over injected collaborators.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    store_timeout: Duration,
    /// Digest verified against when the username is unknown, so a miss costs
    /// the same as a wrong password.
    decoy_digest: String,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        store_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let decoy_digest = hasher.hash("decoy password for unknown users")?;
        Ok(Self {
            store,
            hasher,
            store_timeout,
            decoy_digest,
        })
    }

    /// Register a new identity and log the session in as it.
    pub async fn sign_up(
        &self,
        session: &Session,
        credentials: Credentials,
    ) -> Result<Transition, AuthError> {
        let Credentials { username, password } = credentials.validated()?;

        let hasher = Arc::clone(&self.hasher);
        let digest = offload("password hashing", None, move || {
            hasher.hash(&password).map_err(AuthError::Internal)
        })
        .await?;

        // A timed-out insert is not rolled back: it may still commit after the
        // client got 503, and a retry then sees 409 for that username.
        let store = Arc::clone(&self.store);
        let name = username.clone();
        offload("credential store insert", Some(self.store_timeout), move || {
            store.insert_if_absent(&name, &digest).map_err(AuthError::from)
        })
        .await
        .inspect_err(|e| {
            if matches!(e, AuthError::Conflict) {
                tracing::info!(username = %username, "Sign-up rejected: username taken");
            }
        })?;

        tracing::info!(username = %username, "User registered");
        Ok(Transition {
            session: session.with_user(username.clone()),
            username,
        })
    }

    /// Verify credentials and, on success, log the session in.
    ///
    /// Unknown usernames and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn log_in(
        &self,
        session: &Session,
        credentials: Credentials,
    ) -> Result<Transition, AuthError> {
        let Credentials { username, password } = credentials.validated()?;

        let store = Arc::clone(&self.store);
        let name = username.clone();
        let stored = offload("credential store lookup", Some(self.store_timeout), move || {
            store.get(&name).map_err(AuthError::from)
        })
        .await?;

        let known_user = stored.is_some();
        let digest = stored.unwrap_or_else(|| self.decoy_digest.clone());
        let hasher = Arc::clone(&self.hasher);
        let matches = offload("password verification", None, move || {
            Ok(hasher.verify(&digest, &password))
        })
        .await?;

        if !known_user {
            tracing::debug!(username = %username, "Log-in failed: no such user");
            return Err(AuthError::InvalidCredentials);
        }
        if !matches {
            tracing::debug!(username = %username, "Log-in failed: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(username = %username, "User logged in");
        Ok(Transition {
            session: session.with_user(username.clone()),
            username,
        })
    }

    /// The identity a session is logged in as.
    pub fn welcome(&self, session: &Session) -> Result<String, AuthError> {
        session
            .user()
            .map(str::to_string)
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Clear the session's identity.
    pub fn log_out(&self, session: &Session) -> Result<Transition, AuthError> {
        let username = self.welcome(session)?;
        tracing::info!(username = %username, "User logged out");
        Ok(Transition {
            session: session.without_user(),
            username,
        })
    }
}

/// Run blocking collaborator work off the async runtime, optionally bounded.
///
/// A timed-out call keeps running on the blocking pool; only the request
/// stops waiting for it.
async fn offload<T, F>(
    operation: &'static str,
    timeout: Option<Duration>,
    work: F,
) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::error!("{operation} exceeded {}ms", limit.as_millis());
                return Err(AuthError::Unavailable(operation));
            }
        },
        None => task.await,
    };
    joined.map_err(|e| AuthError::Internal(anyhow::anyhow!("{operation} task failed: {e}")))?
}
