use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    Extension,
};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    handlers::auth::{SESSION_COOKIE, expired_session_cookie},
    models::user::UserProfile,
    services::auth::is_admin,
    state::AppState,
};

/// Extracts the session token from the request cookies.
pub fn extract_session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// A middleware that requires a valid session to be present.
///
/// On success the verified [`UserProfile`] is inserted as a request
/// extension. On failure any stale cookie is cleared and 401 is returned.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_session_token(&cookies).ok_or_else(|| {
        tracing::debug!("❌ No session_token cookie found");
        AppError::Authentication("Not authenticated".to_string())
    })?;

    let user = match state.auth.verify_session(&token).await? {
        Some(user) => user,
        None => {
            cookies.add(expired_session_cookie(&state.config));
            return Err(AppError::Authentication("Session expired or invalid".to_string()));
        }
    };

    tracing::debug!("✅ User authenticated: {}", user.id);

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// A middleware that only lets administrators through.
///
/// Must run after [`require_auth`].
pub async fn require_admin(
    Extension(user): Extension<UserProfile>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    if !is_admin(&user) {
        tracing::warn!("❌ Admin route refused for user: {}", user.id);
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
