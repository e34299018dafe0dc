//! End-to-end flows through the router: sign-up, log-in, welcome, log-out.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sessiongate::auth::{
    Authenticator, CredentialStore, MemoryCredentialStore, Pbkdf2Hasher, SqliteCredentialStore,
    StoreError,
};
use sessiongate::config::{Config, GatewayConfig, SessionConfig, StoreBackend};
use sessiongate::security::AesEncryptor;
use sessiongate::session::CookieSessionStore;
use sessiongate::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: serde_json::Value,
}

fn app_with(store: Arc<dyn CredentialStore>, gateway: &GatewayConfig) -> Router {
    let auth = Authenticator::new(store, Arc::new(Pbkdf2Hasher::new(1_000)), Duration::from_secs(5))
        .unwrap();
    let sessions = CookieSessionStore::new(AesEncryptor::ephemeral(), &SessionConfig::default());
    build_router(AppState::new(auth, sessions), gateway)
}

fn test_app() -> Router {
    app_with(Arc::new(MemoryCredentialStore::new()), &GatewayConfig::default())
}

/// Store that takes longer than the gateway is willing to wait.
struct SlowStore(Duration);

impl CredentialStore for SlowStore {
    fn insert_if_absent(&self, _: &str, _: &str) -> Result<(), StoreError> {
        std::thread::sleep(self.0);
        Ok(())
    }

    fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        std::thread::sleep(self.0);
        Ok(None)
    }
}

async fn dispatch(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));

    Reply {
        status,
        cookie,
        body,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<&str>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(json) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    dispatch(app, request).await
}

fn credentials(username: &str, password: &str) -> String {
    serde_json::json!({ "username": username, "password": password }).to_string()
}

#[tokio::test]
async fn sign_up_welcome_log_out_welcome() {
    let app = test_app();

    let signed_up = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("bob", "pw1")),
    )
    .await;
    assert_eq!(signed_up.status, StatusCode::OK);
    assert_eq!(signed_up.body["username"], "bob");
    let cookie = signed_up.cookie.expect("sign-up sets the session cookie");
    assert!(cookie.starts_with("user-session="));
    assert!(!cookie.contains("pw1"));

    let welcome = send(&app, Method::GET, "/welcome", Some(&cookie), None).await;
    assert_eq!(welcome.status, StatusCode::OK);
    assert_eq!(welcome.body["message"], "Hello, bob");

    let logged_out = send(&app, Method::POST, "/log-out", Some(&cookie), None).await;
    assert_eq!(logged_out.status, StatusCode::OK);
    assert_eq!(logged_out.body["message"], "See you soon, bob");
    let cleared = logged_out.cookie.expect("log-out rewrites the cookie");

    let welcome = send(&app, Method::GET, "/welcome", Some(&cleared), None).await;
    assert_eq!(welcome.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn log_in_failures_are_indistinguishable() {
    let app = test_app();
    send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("bob", "pw1")),
    )
    .await;

    let unknown = send(
        &app,
        Method::POST,
        "/log-in",
        None,
        Some(&credentials("nouser", "anything")),
    )
    .await;
    let wrong = send(
        &app,
        Method::POST,
        "/log-in",
        None,
        Some(&credentials("bob", "wrongpw")),
    )
    .await;

    assert_eq!(unknown.status, StatusCode::FORBIDDEN);
    assert_eq!(unknown.status, wrong.status);
    assert_eq!(unknown.body, wrong.body);
    assert!(unknown.cookie.is_none());
    assert!(wrong.cookie.is_none());
}

#[tokio::test]
async fn log_in_after_sign_up_in_fresh_client() {
    let app = test_app();
    send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("alice", "correct horse")),
    )
    .await;

    let logged_in = send(
        &app,
        Method::POST,
        "/log-in",
        None,
        Some(&credentials("alice", "correct horse")),
    )
    .await;
    assert_eq!(logged_in.status, StatusCode::OK);
    assert_eq!(logged_in.body["message"], "Authorization is successful");

    let cookie = logged_in.cookie.unwrap();
    let welcome = send(&app, Method::GET, "/wellcome", Some(&cookie), None).await;
    assert_eq!(welcome.status, StatusCode::OK);
    assert_eq!(welcome.body["username"], "alice");
}

#[tokio::test]
async fn log_out_twice() {
    let app = test_app();
    let cookie = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("dora", "pw")),
    )
    .await
    .cookie
    .unwrap();

    let first = send(&app, Method::GET, "/log-out", Some(&cookie), None).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = send(
        &app,
        Method::GET,
        "/log-out",
        first.cookie.as_deref(),
        None,
    )
    .await;
    assert_eq!(second.status, StatusCode::FORBIDDEN);
    assert_eq!(second.body["error"], "Not logged in");
}

#[tokio::test]
async fn welcome_on_fresh_client_is_forbidden() {
    let app = test_app();
    let reply = send(&app, Method::GET, "/welcome", None, None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tampered_cookie_is_anonymous() {
    let app = test_app();
    let cookie = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("eve", "pw")),
    )
    .await
    .cookie
    .unwrap();

    // Swap one base64url character in the sealed value.
    let mut chars: Vec<char> = cookie.chars().collect();
    let idx = chars.len() - 5;
    chars[idx] = if chars[idx] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();

    let reply = send(&app, Method::GET, "/welcome", Some(&tampered), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = test_app();
    for body in [
        "not json",
        "{}",
        r#"{"username":"bob"}"#,
        r#"{"username":"","password":"pw"}"#,
        r#"{"username":"bob","password":""}"#,
        r#"{"username":42,"password":"pw"}"#,
    ] {
        let reply = send(&app, Method::POST, "/sign-up", None, Some(body)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(reply.cookie.is_none());

        let reply = send(&app, Method::POST, "/log-in", None, Some(body)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "body {body:?}");
    }
}

#[tokio::test]
async fn duplicate_sign_up_is_conflict() {
    let app = test_app();
    let first = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("frank", "pw")),
    )
    .await;
    assert_eq!(first.status, StatusCode::OK);

    let second = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("frank", "other")),
    )
    .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "Username is already taken");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sign_ups_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(SqliteCredentialStore::open(&tmp.path().join("users.db")).unwrap());
    let auth = Authenticator::new(
        store.clone(),
        Arc::new(Pbkdf2Hasher::new(1_000)),
        Duration::from_secs(5),
    )
    .unwrap();
    let sessions = CookieSessionStore::new(AesEncryptor::ephemeral(), &SessionConfig::default());
    let app = build_router(AppState::new(auth, sessions), &GatewayConfig::default());

    let body_a = credentials("carol", "one");
    let body_b = credentials("carol", "two");
    let (a, b) = tokio::join!(
        send(&app, Method::POST, "/sign-up", None, Some(&body_a)),
        send(&app, Method::POST, "/sign-up", None, Some(&body_b)),
    );

    let mut statuses = [a.status.as_u16(), b.status.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 409]);
    assert_eq!(store.user_count().unwrap(), 1);
}

#[tokio::test]
async fn root_and_health_respond() {
    let app = test_app();
    let root = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(root.status, StatusCode::OK);
    assert_eq!(root.body, serde_json::Value::String("Hello".into()));

    let health = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(health.body["status"], "ok");
}

#[tokio::test]
async fn state_from_config_persists_sessions_across_restarts() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.database_path = Some(tmp.path().join("db").join("users.db").display().to_string());
    config.session.key_file = Some(tmp.path().join("session.key").display().to_string());
    config.password.iterations = 1_000;

    let app = build_router(AppState::from_config(&config).unwrap(), &config.gateway);
    let cookie = send(
        &app,
        Method::POST,
        "/sign-up",
        None,
        Some(&credentials("gina", "pw")),
    )
    .await
    .cookie
    .unwrap();
    drop(app);

    // Same key file and database: the old cookie and account still work.
    let app = build_router(AppState::from_config(&config).unwrap(), &config.gateway);
    let welcome = send(&app, Method::GET, "/welcome", Some(&cookie), None).await;
    assert_eq!(welcome.status, StatusCode::OK);
    assert_eq!(welcome.body["username"], "gina");

    let log_in = send(
        &app,
        Method::POST,
        "/log-in",
        None,
        Some(&credentials("gina", "pw")),
    )
    .await;
    assert_eq!(log_in.status, StatusCode::OK);
}

#[tokio::test]
async fn json_body_without_content_type_is_accepted() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/sign-up")
        .body(Body::from(credentials("bob", "pw1")))
        .unwrap();
    let reply = dispatch(&app, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["username"], "bob");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/log-in")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(credentials("bob", "pw1")))
        .unwrap();
    let reply = dispatch(&app, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.cookie.is_some());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = test_app();
    let body = credentials("bob", &"p".repeat(70_000));

    // Streamed: no Content-Length, the limit trips while reading.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/sign-up")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.clone()))
        .unwrap();
    let reply = dispatch(&app, request).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.body["error"], "Request body too large");
    assert!(reply.cookie.is_none());

    // Declared: rejected before the handler runs.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/log-in")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    let reply = dispatch(&app, request).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn slow_request_times_out() {
    let gateway = GatewayConfig {
        request_timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let app = app_with(Arc::new(SlowStore(Duration::from_secs(2))), &gateway);

    let reply = send(
        &app,
        Method::POST,
        "/log-in",
        None,
        Some(&credentials("bob", "pw1")),
    )
    .await;
    assert_eq!(reply.status, StatusCode::REQUEST_TIMEOUT);
    assert!(reply.cookie.is_none());
}
