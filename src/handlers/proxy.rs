use std::time::Instant;

use axum::{
    Extension,
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    models::session::Session,
    services::upstream::{forwardable_request_headers, strip_hop_by_hop},
    state::AppState,
};

/// Forwards an authenticated request to the upstream bot API.
///
/// The Bearer token is decrypted on demand (never cached on the session),
/// the client's own `Authorization` and hop-by-hop headers are stripped, and
/// the upstream response is relayed verbatim minus hop-by-hop headers.
pub async fn proxy(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    request: Request<Body>,
) -> Response {
    let token = match state.sessions.get_token(&session.id) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("Failed to get token for session: {}", e);
            return AppError::Unauthorized.into_response();
        }
    };

    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = forwardable_request_headers(request.headers());

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::InvalidInput(format!("failed to read request body: {}", e))
                .into_response();
        }
    };

    let start = Instant::now();
    let upstream_response = match state
        .upstream
        .forward(method.clone(), &path_and_query, headers, body, &token)
        .await
    {
        Ok(response) => response,
        Err(e) => return e.into_response(),
    };

    let status = upstream_response.status();
    let response_headers = strip_hop_by_hop(upstream_response.headers());

    let body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::UpstreamUnavailable(format!("failed to read upstream body: {}", e))
                .into_response();
        }
    };

    tracing::info!(
        method = %method,
        path = %path_and_query,
        status = %status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "proxied request"
    );

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
