//! Failure taxonomy for the authentication flow.

use crate::session::SessionError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing request fields.
    #[error("Invalid request: {0}")]
    BadInput(String),

    /// Unknown username or wrong password. Deliberately carries no detail.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The action requires a logged-in session.
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Username is already taken")]
    Conflict,

    /// Request body exceeded the gateway's size limit.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// A collaborator did not answer in time.
    #[error("{0} timed out")]
    Unavailable(&'static str),

    #[error("Session persistence failed: {0}")]
    Persistence(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::Conflict,
            other => AuthError::Internal(other.into()),
        }
    }
}
