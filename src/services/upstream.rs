use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName};
use http::Method;

use crate::error::{AppError, Result};

/// Headers meaningful only to the immediate connection (RFC 9110 §7.6.1).
/// Never relayed in either direction.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    http::header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    http::header::PROXY_AUTHENTICATE,
    http::header::PROXY_AUTHORIZATION,
    http::header::TE,
    http::header::TRAILER,
    http::header::TRANSFER_ENCODING,
    http::header::UPGRADE,
];

/// Removes hop-by-hop and framing headers from a header set about to cross
/// the proxy boundary. `Content-Length` is recomputed from the actual body.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if HOP_BY_HOP_HEADERS.contains(name) || *name == CONTENT_LENGTH {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Prepares the client's headers for forwarding upstream: hop-by-hop headers,
/// the client's own `Authorization`, and `Host` are all dropped. The real
/// Bearer token is injected separately.
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = strip_hop_by_hop(headers);
    filtered.remove(AUTHORIZATION);
    filtered.remove(HOST);
    filtered
}

/// HTTP client for the upstream bot API.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build upstream HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Validates a submitted Bearer credential by calling the upstream config
    /// endpoint with it. Any transport failure or non-success status counts
    /// as an invalid credential; detail goes to the log, not the caller.
    pub async fn validate_token(&self, token: &str) -> Result<()> {
        let url = format!("{}/api/config", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Bearer token validation request failed: {}", e);
                AppError::Unauthorized
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                "Bearer token validation rejected upstream: {}",
                response.status()
            );
            return Err(AppError::Unauthorized);
        }

        Ok(())
    }

    /// Forwards one request upstream with the decrypted Bearer token injected.
    ///
    /// `path_and_query` keeps the original path and query string; `headers`
    /// must already be filtered via `forwardable_request_headers`. The
    /// configured timeout is scoped to this request only; the future is also
    /// dropped if the incoming request is cancelled.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: axum::body::Bytes,
        token: &str,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path_and_query);

        self.client
            .request(method, &url)
            .headers(headers)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout
                } else {
                    AppError::UpstreamUnavailable(e.to_string())
                }
            })
    }
}
