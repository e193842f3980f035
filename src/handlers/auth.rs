use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};
use tower_cookies::cookie::{SameSite, time::Duration};

use crate::{
    config::Config,
    error::{AppError, Result},
    middleware_layer::auth::extract_session_token,
    models::user::{Role, UserProfile},
    state::AppState,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// The request payload for login.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub house_number: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub password: String,
}

/// The request payload for changing the caller's password.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub current_password: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub new_password: String,
}

/// The request payload for changing a user's role.
#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// The response payload for login and role changes.
#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserProfile,
}

/// The response payload for session checks.
#[derive(Serialize)]
pub struct SessionResponse {
    pub user: Option<UserProfile>,
    pub authenticated: bool,
}

/// The response payload for requests without data.
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Builds the session cookie carrying `token`.
pub fn session_cookie(config: &Config, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);

    cookie.set_http_only(true);
    cookie.set_secure(config.secure_cookies());
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(Duration::seconds(config.session_ttl_secs()));
    cookie.set_path("/");

    cookie
}

/// Builds the cookie that clears the session on the client.
pub fn expired_session_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = session_cookie(config, String::new());
    cookie.set_max_age(Duration::seconds(0));
    cookie
}

fn json_body<T: Validate<Context = ()>>(payload: std::result::Result<Json<T>, JsonRejection>, message: &str) -> Result<T> {
    let Json(body) = payload.map_err(|e| {
        tracing::debug!("Rejected body: {}", e);
        AppError::Validation(message.to_string())
    })?;

    body.validate()
        .map_err(|_| AppError::Validation(message.to_string()))?;

    Ok(body)
}

/// Handles login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload, "House number and password are required")?;

    tracing::info!("🔐 Login attempt for house: {}", payload.house_number.trim());

    let outcome = state
        .auth
        .login(&payload.house_number, &payload.password)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid house number or password".to_string()))?;

    cookies.add(session_cookie(&state.config, outcome.token));
    tracing::info!("✅ User logged in: {}", outcome.user.id);

    let response = UserResponse {
        success: true,
        user: outcome.user,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles logout. Always succeeds; store failures are only logged.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Response {
    if let Some(token) = extract_session_token(&cookies) {
        if let Err(e) = state.auth.logout(&token).await {
            tracing::error!("❌ Session revocation failed: {}", e);
        }
    }

    cookies.add(expired_session_cookie(&state.config));

    (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
}

/// Reports whether the request carries a valid session.
#[axum::debug_handler]
pub async fn session(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Response> {
    let user = match extract_session_token(&cookies) {
        Some(token) => {
            let user = state.auth.verify_session(&token).await?;
            if user.is_none() {
                cookies.add(expired_session_cookie(&state.config));
            }
            user
        }
        None => None,
    };

    let response = SessionResponse {
        authenticated: user.is_some(),
        user,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles changing the caller's password.
#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<UserProfile>,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload, "Current and new password are required")?;

    tracing::info!("🔑 Change password for user: {}", user.id);

    let changed = state
        .auth
        .change_password(user.id, &payload.current_password, &payload.new_password)
        .await?;

    if !changed {
        return Err(AppError::Authentication("Invalid current password".to_string()));
    }

    Ok((StatusCode::OK, Json(SuccessResponse { success: true })).into_response())
}

/// Handles an administrator changing a user's role.
#[axum::debug_handler]
pub async fn set_role(
    State(state): State<AppState>,
    Extension(admin): Extension<UserProfile>,
    Path(house_number): Path<String>,
    payload: std::result::Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = payload
        .map_err(|_| AppError::Validation("Role must be \"admin\" or \"resident\"".to_string()))?;

    tracing::info!(
        "🛡️ Admin {} sets role of house {} to {:?}",
        admin.id,
        house_number,
        payload.role
    );

    let user = state
        .auth
        .set_role(&house_number, payload.role)
        .await?
        .ok_or(AppError::NotFound)?;

    let response = UserResponse {
        success: true,
        user,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
