use axum::{
    Extension,
    body::Body,
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::{error::AppError, models::session::Session};

/// The request header carrying the double-submit CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// A middleware that enforces the double-submit CSRF check.
///
/// Runs inside `require_auth`, so the session has already been validated and
/// attached. Safe methods pass through untouched; any state-changing method
/// must echo the session's CSRF token in the `X-CSRF-Token` header.
pub async fn verify_csrf(
    Extension(session): Extension<Session>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if is_safe_method(req.method()) {
        return next.run(req).await;
    }

    let Some(header_token) = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return AppError::Forbidden("CSRF token required".to_string()).into_response();
    };

    let matches: bool = header_token
        .as_bytes()
        .ct_eq(session.csrf_token.as_bytes())
        .into();
    if !matches {
        return AppError::Forbidden("CSRF token mismatch".to_string()).into_response();
    }

    next.run(req).await
}
