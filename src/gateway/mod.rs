//! Axum-based HTTP gateway for the authentication flow.
//!
//! Each handler opens the request's session, runs one state-machine
//! transition, persists the resulting session into `Set-Cookie` and only
//! then writes a success body. Any failure, including a failed persist,
//! is returned as an error response instead.
//!
//! Routes:
//! - `POST /sign-up`, `POST /log-in` with `{"username","password"}`; the body
//!   is decoded as JSON whatever its `Content-Type`
//! - `GET /welcome` (also `/wellcome`)
//! - `GET|POST /log-out`
//! - `GET /`, `GET /health`

use crate::auth::{
    AuthError, Authenticator, CredentialStore, Credentials, MemoryCredentialStore,
    Pbkdf2Hasher, SqliteCredentialStore,
};
use crate::config::{Config, GatewayConfig, StoreBackend};
use crate::security::AesEncryptor;
use crate::session::{CookieSessionStore, Session, SessionStore};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(auth: Authenticator, sessions: impl SessionStore + 'static) -> Self {
        Self {
            auth: Arc::new(auth),
            sessions: Arc::new(sessions),
        }
    }

    /// Wire collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match config.store.backend {
            StoreBackend::Sqlite => {
                let path = config.database_path();
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).with_context(|| {
                            format!("Failed to create data directory {}", parent.display())
                        })?;
                    }
                }
                tracing::info!(path = %path.display(), "Opening credential database");
                Arc::new(SqliteCredentialStore::open(&path).with_context(|| {
                    format!("Failed to open credential database {}", path.display())
                })?)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory credential store; accounts are lost on exit");
                Arc::new(MemoryCredentialStore::new())
            }
        };

        let hasher = Arc::new(Pbkdf2Hasher::new(config.password.iterations));
        let auth = Authenticator::new(
            store,
            hasher,
            Duration::from_millis(config.store.timeout_ms),
        )?;

        let encryptor = match config.key_file_path() {
            Some(path) => AesEncryptor::load_or_generate(&path)
                .with_context(|| format!("Failed to load session key {}", path.display()))?,
            None => {
                tracing::warn!(
                    "No session.key_file configured; using an ephemeral key, sessions end on restart"
                );
                AesEncryptor::ephemeral()
            }
        };
        let sessions = CookieSessionStore::new(encryptor, &config.session);

        Ok(Self::new(auth, sessions))
    }
}

/// Build the router with body limit, timeout and request tracing.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/sign-up", post(handle_sign_up))
        .route("/log-in", post(handle_log_in))
        .route("/welcome", get(handle_welcome))
        .route("/wellcome", get(handle_welcome))
        .route("/log-out", get(handle_log_out).post(handle_log_out))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ))
}

/// Run the HTTP gateway until ctrl-c / SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state, &config.gateway);

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

// ══════════════════════════════════════════════════════════════════════════════
// ERROR RESPONSES
// ══════════════════════════════════════════════════════════════════════════════

fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::BadInput(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::NotAuthenticated => StatusCode::FORBIDDEN,
        AuthError::Conflict => StatusCode::CONFLICT,
        AuthError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Persistence(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            AuthError::Persistence(_) | AuthError::Internal(_) => {
                tracing::error!("{self}");
                "Internal Server Error".to_string()
            }
            AuthError::Unavailable(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

type GatewayResult = Result<Response, AuthError>;

/// Decode a credentials body. A body cut off by the size limit is 413; any
/// other unreadable or non-JSON body is 400.
fn parse_body(body: Result<Bytes, BytesRejection>) -> Result<Credentials, AuthError> {
    let bytes = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AuthError::PayloadTooLarge
        } else {
            AuthError::BadInput(e.body_text())
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::BadInput(e.to_string()))
}

/// Persist `session`, then build the 200 response. Nothing claims success
/// unless the cookie was produced.
fn respond_with_session(
    state: &AppState,
    session: &Session,
    body: serde_json::Value,
) -> GatewayResult {
    let cookie = state.sessions.persist(session)?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// GET / — liveness text
async fn handle_root() -> &'static str {
    "Hello"
}

/// GET /health
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /sign-up — register and log the session in.
async fn handle_sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> GatewayResult {
    let session = state.sessions.open(&headers);
    let credentials = parse_body(body)?;
    let transition = state.auth.sign_up(&session, credentials).await?;

    respond_with_session(
        &state,
        &transition.session,
        json!({
            "status": "registered",
            "username": transition.username,
            "message": format!("Registration is successful. Welcome, {}", transition.username),
        }),
    )
}

/// POST /log-in — verify credentials and log the session in.
async fn handle_log_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> GatewayResult {
    let session = state.sessions.open(&headers);
    let credentials = parse_body(body)?;
    let transition = state.auth.log_in(&session, credentials).await?;

    respond_with_session(
        &state,
        &transition.session,
        json!({
            "status": "authenticated",
            "username": transition.username,
            "message": "Authorization is successful",
        }),
    )
}

/// GET /welcome — greet the logged-in user.
async fn handle_welcome(State(state): State<AppState>, headers: HeaderMap) -> GatewayResult {
    let session = state.sessions.open(&headers);
    let username = state.auth.welcome(&session)?;

    Ok(Json(json!({
        "username": username,
        "message": format!("Hello, {username}"),
    }))
    .into_response())
}

/// GET|POST /log-out — clear the session's identity.
async fn handle_log_out(State(state): State<AppState>, headers: HeaderMap) -> GatewayResult {
    let session = state.sessions.open(&headers);
    let transition = state.auth.log_out(&session)?;

    respond_with_session(
        &state,
        &transition.session,
        json!({
            "status": "logged_out",
            "username": transition.username,
            "message": format!("See you soon, {}", transition.username),
        }),
    )
}
