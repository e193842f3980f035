use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use residence_portal::{
    app,
    config::Config,
    crypto::token::digest_token,
    error::{AppError, Result},
    models::{
        session::Session,
        user::{Role, User},
    },
    repositories::{
        memory::MemoryStore,
        store::SessionStore,
        throttle::{LoginThrottle, MemoryThrottle},
    },
    state::AppState,
};

const PASSWORD: &str = "correct-horse";

// Shared test context
struct TestContext {
    app: Router,
    store: MemoryStore,
    state: AppState,
}

impl TestContext {
    async fn new() -> Self {
        Self::build(Config::default(), None).await
    }

    async fn build(config: Config, throttle: Option<Arc<dyn LoginThrottle>>) -> Self {
        let store = MemoryStore::new();
        let state = AppState::with_store(config, Arc::new(store.clone()), throttle);

        state
            .auth
            .provision_user("A1", PASSWORD, Role::Resident)
            .await
            .unwrap();
        state
            .auth
            .provision_user("ADM", PASSWORD, Role::Admin)
            .await
            .unwrap();

        Self {
            app: app::router(state.clone()),
            store,
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("session_token="))
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, set_cookie, body)
    }

    async fn login(&self, house_number: &str, password: &str) -> (StatusCode, Option<String>, Value) {
        self.send(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "houseNumber": house_number, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
    }

    async fn login_token(&self, house_number: &str) -> String {
        let (status, set_cookie, _) = self.login(house_number, PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        cookie_value(&set_cookie.expect("session cookie"))
    }

    async fn get_session(&self, token: Option<&str>) -> (StatusCode, Option<String>, Value) {
        let mut request = Request::get("/auth/session");
        if let Some(token) = token {
            request = request.header(header::COOKIE, format!("session_token={}", token));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }
}

fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("session_token="))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_login_session_logout_flow() {
    let ctx = TestContext::new().await;

    // Step 1: Login
    let (status, set_cookie, body) = ctx.login("A1", PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "Login failed");
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["houseNumber"], "A1");
    assert_eq!(body["user"]["role"], "resident");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(!body.to_string().contains("argon2"));

    let set_cookie = set_cookie.expect("session cookie not set");
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=86400"));
    assert!(!set_cookie.contains("Secure"));
    let token = cookie_value(&set_cookie);
    assert!(!token.is_empty());

    // Step 2: Session check
    let (status, _, body) = ctx.get_session(Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["houseNumber"], "A1");

    // Step 3: Logout
    let response = ctx
        .send(
            Request::post("/auth/logout")
                .header(header::COOKIE, format!("session_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.0, StatusCode::OK);
    assert_eq!(response.2["success"], true);
    let cleared = response.1.expect("logout must clear the cookie");
    assert!(cleared.starts_with("session_token=;"));
    assert!(cleared.contains("Max-Age=0"));

    // Step 4: Session is gone
    let (status, _, body) = ctx.get_session(Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["user"], Value::Null);
}

#[tokio::test]
async fn test_bad_credentials_are_uniform() {
    let ctx = TestContext::new().await;

    let (wrong_status, wrong_cookie, wrong_body) = ctx.login("A1", "not-the-password").await;
    let (unknown_status, unknown_cookie, unknown_body) = ctx.login("Z9", PASSWORD).await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert!(wrong_body["error"].is_string());
    assert!(wrong_cookie.is_none());
    assert!(unknown_cookie.is_none());
    assert_eq!(ctx.store.session_count().await, 0);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let ctx = TestContext::new().await;

    let (status, _, body) = ctx.login("", PASSWORD).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _, _) = ctx
        .send(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"houseNumber":"A1"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = ctx
        .send(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(ctx.store.session_count().await, 0);
}

#[tokio::test]
async fn test_session_without_cookie() {
    let ctx = TestContext::new().await;

    let (status, set_cookie, body) = ctx.get_session(None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["user"], Value::Null);
    assert!(set_cookie.is_none());
}

#[tokio::test]
async fn test_stale_cookie_is_cleared() {
    let ctx = TestContext::new().await;

    let (status, set_cookie, body) = ctx.get_session(Some("forged-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert!(set_cookie.unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_expired_session_is_rejected_but_kept() {
    let ctx = TestContext::new().await;
    let user = ctx.store.find_user_by_house_number("A1").await.unwrap().unwrap();

    let now = Utc::now();
    ctx.store
        .insert_session(&Session {
            token_hash: digest_token("expired-token"),
            user_id: user.id,
            created_at: now - Duration::hours(25),
            expires_at: now - Duration::hours(1),
        })
        .await
        .unwrap();

    let (status, set_cookie, body) = ctx.get_session(Some("expired-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert!(set_cookie.unwrap().contains("Max-Age=0"));
    assert!(ctx.store.find_session(&digest_token("expired-token")).await.unwrap().is_some());

    assert_eq!(ctx.state.auth.purge_expired_sessions().await.unwrap(), 1);
    assert!(ctx.store.find_session(&digest_token("expired-token")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let ctx = TestContext::new().await;
    let token = ctx.login_token("A1").await;

    for _ in 0..2 {
        let (status, _, body) = ctx
            .send(
                Request::post("/auth/logout")
                    .header(header::COOKIE, format!("session_token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, _, _) = ctx
        .send(Request::post("/auth/logout").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_two_devices_hold_independent_sessions() {
    let ctx = TestContext::new().await;

    let (first, second) = tokio::join!(ctx.login_token("A1"), ctx.login_token("A1"));
    assert_ne!(first, second);

    ctx.send(
        Request::post("/auth/logout")
            .header(header::COOKIE, format!("session_token={}", first))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let (_, _, body) = ctx.get_session(Some(&first)).await;
    assert_eq!(body["authenticated"], false);
    let (_, _, body) = ctx.get_session(Some(&second)).await;
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_change_password_requires_session() {
    let ctx = TestContext::new().await;

    let request = |token: Option<&str>, current: &str| {
        let mut builder = Request::post("/auth/change-password")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session_token={}", token));
        }
        builder
            .body(Body::from(
                json!({ "currentPassword": current, "newPassword": "another-password" }).to_string(),
            ))
            .unwrap()
    };

    let (status, _, _) = ctx.send(request(None, PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, set_cookie, _) = ctx.send(request(Some("forged-token"), PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(set_cookie.unwrap().contains("Max-Age=0"));

    let token = ctx.login_token("A1").await;

    let (status, _, _) = ctx.send(request(Some(&token), "wrong-current")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = ctx.send(request(Some(&token), PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _, _) = ctx.login("A1", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = ctx.login("A1", "another-password").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_change_is_admin_only() {
    let ctx = TestContext::new().await;

    let set_role = |token: &str, house: &str| {
        Request::put(format!("/auth/users/{}/role", house))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("session_token={}", token))
            .body(Body::from(json!({ "role": "admin" }).to_string()))
            .unwrap()
    };

    let resident = ctx.login_token("A1").await;
    let (status, _, _) = ctx.send(set_role(&resident, "A1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = ctx.login_token("ADM").await;
    let (status, _, _) = ctx.send(set_role(&admin, "Z9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = ctx.send(set_role(&admin, "A1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");

    let (_, _, body) = ctx.get_session(Some(&resident)).await;
    assert_eq!(body["user"]["role"], "admin");
}

struct UnreachableStore;

fn unreachable<T>() -> Result<T> {
    Err(AppError::Internal("connection refused by db.internal:5432".to_string()))
}

#[async_trait]
impl SessionStore for UnreachableStore {
    async fn find_user_by_house_number(&self, _: &str) -> Result<Option<User>> {
        unreachable()
    }
    async fn find_user_by_id(&self, _: Uuid) -> Result<Option<User>> {
        unreachable()
    }
    async fn insert_user(&self, _: &User) -> Result<()> {
        unreachable()
    }
    async fn update_password_hash(&self, _: Uuid, _: &str) -> Result<()> {
        unreachable()
    }
    async fn update_role(&self, _: &str, _: Role) -> Result<Option<User>> {
        unreachable()
    }
    async fn insert_session(&self, _: &Session) -> Result<()> {
        unreachable()
    }
    async fn find_session(&self, _: &str) -> Result<Option<Session>> {
        unreachable()
    }
    async fn delete_session(&self, _: &str) -> Result<()> {
        unreachable()
    }
    async fn purge_expired_sessions(&self, _: DateTime<Utc>) -> Result<u64> {
        unreachable()
    }
}

#[tokio::test]
async fn test_store_failure_is_opaque() {
    let state = AppState::with_store(Config::default(), Arc::new(UnreachableStore), None);
    let app = app::router(state);

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "houseNumber": "A1", "password": PASSWORD }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Internal server error");

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header(header::COOKIE, "session_token=whatever")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::get("/auth/session")
                .header(header::COOKIE, "session_token=whatever")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_failed_logins_lock_out_the_house_number() {
    let config = Config {
        login_max_attempts: 3,
        ..Config::default()
    };
    let throttle = MemoryThrottle::new();
    let ctx = TestContext::build(config, Some(Arc::new(throttle.clone()))).await;

    // Step 1: Failures below the limit stay 401, success resets the count
    for _ in 0..2 {
        let (status, _, _) = ctx.login("A1", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, _) = ctx.login("A1", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(throttle.failed_attempts("rate_limit:login:A1").await.unwrap(), 0);

    // Step 2: Reaching the limit locks the house number
    for _ in 0..3 {
        let (status, _, _) = ctx.login("A1", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _, body) = ctx.login("A1", "wrong-password").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("15 minutes"));

    // Step 3: The correct password is refused too, without a session
    let (status, set_cookie, _) = ctx.login("A1", PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(set_cookie.is_none());
    assert_eq!(ctx.store.session_count().await, 1);

    // Step 4: Other house numbers are unaffected
    let (status, _, _) = ctx.login("ADM", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

struct BrokenThrottle;

#[async_trait]
impl LoginThrottle for BrokenThrottle {
    async fn failed_attempts(&self, _: &str) -> Result<u32> {
        Err(AppError::Internal("throttle unreachable".to_string()))
    }
    async fn retry_after_secs(&self, _: &str) -> Result<u64> {
        Err(AppError::Internal("throttle unreachable".to_string()))
    }
    async fn record_failure(&self, _: &str, _: u64) -> Result<()> {
        Err(AppError::Internal("throttle unreachable".to_string()))
    }
    async fn clear(&self, _: &str) -> Result<()> {
        Err(AppError::Internal("throttle unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_throttle_failure_does_not_block_login() {
    let config = Config {
        login_max_attempts: 1,
        ..Config::default()
    };
    let ctx = TestContext::build(config, Some(Arc::new(BrokenThrottle))).await;

    for _ in 0..3 {
        let (status, _, _) = ctx.login("A1", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, set_cookie, _) = ctx.login("A1", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert!(set_cookie.is_some());
}
