use axum::{
    Json,
    extract::{ConnectInfo, State},
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_cookies::{Cookie, Cookies};
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::Duration as CookieDuration;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::SESSION_COOKIE,
    services::client_ip::resolve_client_ip,
    state::AppState,
};

/// The request payload for login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub token: String,
}

/// The response payload for a successful login.
#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    /// Issued exactly once, to the same-origin script that just
    /// authenticated; echoed back in `X-CSRF-Token` on unsafe requests.
    pub csrf_token: String,
}

/// The response payload for logout and other message-only endpoints.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Builds the session cookie with the fixed hardening attributes.
///
/// `Secure` follows the explicit HTTPS-mode setting; the request scheme is
/// never trusted for this because it is unreliable behind a terminating
/// reverse proxy.
fn session_cookie(state: &AppState, value: String, max_age_secs: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_secure(state.config.https_mode);
    cookie.set_path(state.config.cookie_path.clone());
    cookie.set_max_age(CookieDuration::seconds(max_age_secs));
    cookie
}

/// Handles login: rate-limit check, upstream credential validation, session
/// creation, cookie issuance.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    cookies: Cookies,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let ip = resolve_client_ip(peer, &headers, &state.config.trusted_proxies);

    // Rate-limited callers learn nothing about whether the credential would
    // even have been checked.
    if !state.login_limiter.check_allowed(&ip) {
        return Err(AppError::RateLimited {
            retry_after_secs: state.login_limiter.window().as_secs(),
        });
    }

    let Json(payload) =
        payload.map_err(|_| AppError::InvalidInput("invalid request body".to_string()))?;

    if payload.token.is_empty() {
        return Err(AppError::InvalidInput("bearer token is required".to_string()));
    }
    // The submitted value is a full Authorization header value; the session
    // stores only the credential itself, the Bearer prefix is re-added when
    // forwarding.
    let Some(credential) = payload.token.strip_prefix("Bearer ") else {
        return Err(AppError::InvalidInput("token must use Bearer prefix".to_string()));
    };
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(AppError::InvalidInput("bearer token is required".to_string()));
    }

    if let Err(e) = state.upstream.validate_token(&payload.token).await {
        state.login_limiter.record_failure(&ip);
        tracing::info!(ip = %ip, success = false, "login attempt");
        return Err(e);
    }

    let session = state
        .sessions
        .create(credential, None)
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;

    state.login_limiter.reset(&ip);

    cookies.add(session_cookie(
        &state,
        session.id.clone(),
        state.config.session_timeout.as_secs() as i64,
    ));

    tracing::info!(ip = %ip, success = true, "login attempt");

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            csrf_token: session.csrf_token,
        }),
    )
        .into_response())
}

/// Handles logout: deletes the session if a cookie is present and clears the
/// cookie unconditionally. Always 200, even with no cookie at all.
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        if let Err(e) = state.sessions.delete(&session_id) {
            tracing::debug!("Failed to delete session on logout: {}", e);
        }
    }

    // Max-Age=0 expires the cookie immediately; path must match the original.
    cookies.remove(session_cookie(&state, String::new(), 0));

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
        .into_response()
}

/// Liveness endpoint; bypasses auth.
pub async fn health() -> &'static str {
    "OK"
}
