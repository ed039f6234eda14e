use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{error::AppError, state::AppState};

/// The fixed name of the session cookie.
pub const SESSION_COOKIE: &str = "proxy_session";

/// Extracts the session identifier from the request cookies.
fn extract_session_id(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// A middleware that requires a valid session.
///
/// Every failure mode (missing cookie, unknown/expired session, malformed
/// identifier) produces the same generic 401 so callers cannot probe session
/// state. Success attaches the `Session` to the request as a typed extension.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(session_id) = extract_session_id(&cookies) else {
        tracing::debug!("No session cookie on {}", request.uri().path());
        return AppError::Unauthorized.into_response();
    };

    let session = match state.sessions.get(&session_id) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!("Session lookup failed: {}", e);
            return e.into_response();
        }
    };

    request.extensions_mut().insert(session);

    next.run(request).await
}
