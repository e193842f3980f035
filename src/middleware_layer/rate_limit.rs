use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sonic_rs::JsonValueTrait;

use crate::{error::AppError, state::AppState};

/// Largest login body the throttle will buffer.
const MAX_LOGIN_BODY_BYTES: usize = 16 * 1024;

fn extract_house_number(body_bytes: &[u8]) -> Option<String> {
    let json = sonic_rs::from_slice::<sonic_rs::Value>(body_bytes).ok()?;
    json.get("houseNumber")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A middleware that throttles failed logins per house number.
///
/// Every 401 counts a failure that lives for the lockout window; a
/// successful login clears the count. Once the count reaches the configured
/// limit, attempts are refused with 429 without touching the session store.
/// Throttle errors are logged and never block a login.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(throttle) = state.throttle.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_LOGIN_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let Some(house_number) = extract_house_number(&body_bytes) else {
        return next.run(Request::from_parts(parts, Body::from(body_bytes))).await;
    };

    let key = format!("rate_limit:login:{}", house_number);

    let attempts = throttle.failed_attempts(&key).await.unwrap_or_else(|e| {
        tracing::error!("❌ Login throttle lookup failed: {}", e);
        0
    });

    if attempts >= state.config.login_max_attempts {
        let retry_after = throttle.retry_after_secs(&key).await.unwrap_or_else(|e| {
            tracing::error!("❌ Login throttle TTL lookup failed: {}", e);
            state.config.login_lockout_secs
        });

        tracing::warn!("🚫 Login locked out for house: {}", house_number);
        return AppError::RateLimitExceeded(format!(
            "Too many failed login attempts. Try again in {} minutes",
            retry_after.div_ceil(60)
        ))
        .into_response();
    }

    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;

    if response.status() == StatusCode::UNAUTHORIZED {
        if let Err(e) = throttle
            .record_failure(&key, state.config.login_lockout_secs)
            .await
        {
            tracing::error!("❌ Failed to record login failure for {}: {}", house_number, e);
        }
    } else if response.status().is_success() {
        if let Err(e) = throttle.clear(&key).await {
            tracing::error!("❌ Failed to clear login throttle for {}: {}", house_number, e);
        }
    }

    response
}
