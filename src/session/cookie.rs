//! Sealed-cookie session store.
//!
//! The bag is serialized as JSON and sealed with AES-256-GCM. The cookie name
//! is the associated data, so a value lifted from another cookie does not
//! open here.

use super::{Session, SessionError, SessionStore};
use crate::config::SessionConfig;
use crate::security::AesEncryptor;
use axum::http::{header, HeaderMap, HeaderValue};

/// Production [`SessionStore`] keeping the whole bag client-side.
#[derive(Debug, Clone)]
pub struct CookieSessionStore {
    encryptor: AesEncryptor,
    cookie_name: String,
    max_age_secs: u64,
    secure: bool,
}

impl CookieSessionStore {
    pub fn new(encryptor: AesEncryptor, config: &SessionConfig) -> Self {
        Self {
            encryptor,
            cookie_name: config.cookie_name.clone(),
            max_age_secs: config.max_age_secs,
            secure: config.secure,
        }
    }

    /// Seal a session into a cookie value (no attributes).
    pub fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let plaintext = serde_json::to_vec(session)?;
        self.encryptor
            .seal(&plaintext, self.cookie_name.as_bytes())
            .map_err(SessionError::Seal)
    }

    /// Open a cookie value. `None` when it was not produced by this store.
    pub fn decode(&self, value: &str) -> Option<Session> {
        let plaintext = match self.encryptor.open(value, self.cookie_name.as_bytes()) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Discarding unreadable session cookie: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&plaintext) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Session cookie opened but did not parse: {e}");
                None
            }
        }
    }

    fn render_set_cookie(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={value}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name, self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

impl SessionStore for CookieSessionStore {
    fn open(&self, headers: &HeaderMap) -> Session {
        cookie_values(headers, &self.cookie_name)
            .find_map(|value| self.decode(value))
            .unwrap_or_default()
    }

    fn persist(&self, session: &Session) -> Result<HeaderValue, SessionError> {
        let value = self.encode(session)?;
        Ok(HeaderValue::from_str(&self.render_set_cookie(&value))?)
    }
}

/// All values of cookie `name` across every `Cookie` header, in order.
fn cookie_values<'a>(headers: &'a HeaderMap, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(move |pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"'))
        })
}
