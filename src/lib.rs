//! sessiongate — a small authentication gateway.
//!
//! Users sign up and log in with a username and password; login state lives
//! in an AES-256-GCM sealed cookie, so the server keeps no session table.
//! The `welcome` endpoint is only reachable with a logged-in session.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod security;
pub mod session;

pub use auth::{AuthError, Authenticator, Credentials};
pub use config::Config;
pub use gateway::{build_router, run_gateway, AppState};
pub use session::{AuthState, Session, SessionStore};
