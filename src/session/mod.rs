//! Client-held session state.
//!
//! A [`Session`] is a tiny attribute bag carried inside a sealed cookie. The
//! server keeps no session table: each request opens its own copy, the auth
//! layer computes a new bag, and the gateway persists that bag back into the
//! response.
//!
//! ## Design Decisions
//! - Sessions are values. `with_user` / `without_user` return a new bag and
//!   never mutate the one that was opened.
//! - Opening never fails. A missing, forged or tampered cookie is an
//!   anonymous session.
//! - Logging out is a client-trusted clear; there is nothing to revoke.

pub mod cookie;

pub use cookie::CookieSessionStore;

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication state derived from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(String),
}

/// Per-client attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl Session {
    /// A session with no authenticated user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The authenticated username, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn state(&self) -> AuthState {
        match &self.user {
            Some(user) => AuthState::Authenticated(user.clone()),
            None => AuthState::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Copy of this session asserting `username` as the identity.
    #[must_use]
    pub fn with_user(&self, username: impl Into<String>) -> Self {
        Self {
            user: Some(username.into()),
        }
    }

    /// Copy of this session with the identity removed.
    #[must_use]
    pub fn without_user(&self) -> Self {
        Self { user: None }
    }
}

/// Failure to write a session back to the client.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to seal session: {0}")]
    Seal(anyhow::Error),

    #[error("session cookie is not a valid header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
}

/// Reads sessions from requests and renders them into `Set-Cookie` values.
pub trait SessionStore: Send + Sync {
    /// Derive the session for a request. Never fails; anything unreadable
    /// becomes [`Session::anonymous`].
    fn open(&self, headers: &HeaderMap) -> Session;

    /// Render `session` as a `Set-Cookie` header value.
    fn persist(&self, session: &Session) -> Result<HeaderValue, SessionError>;
}
