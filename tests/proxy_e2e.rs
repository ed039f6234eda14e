use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};

use botproxy::config::Config;
use botproxy::routes::app;
use botproxy::state::AppState;

const VALID_TOKEN: &str = "Bearer valid-credential";

fn temp_base(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("botproxy_e2e_{}_{}", tag, nanos))
}

fn test_config(tag: &str, upstream_url: &str) -> Config {
    let base = temp_base(tag);
    std::fs::create_dir_all(&base).unwrap();
    Config {
        port: 0,
        upstream_api_url: upstream_url.to_string(),
        session_timeout: Duration::from_secs(3600),
        sessions_dir: base.join("sessions"),
        session_key_file: base.join(".session_key"),
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max_attempts: 5,
        upstream_timeout: Duration::from_secs(10),
        https_mode: false,
        cookie_path: "/".to_string(),
        trusted_proxies: Vec::new(),
    }
}

/// A stand-in for the upstream bot API.
async fn spawn_upstream() -> String {
    async fn config_endpoint(headers: HeaderMap) -> impl IntoResponse {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == VALID_TOKEN)
            .unwrap_or(false);
        if authorized {
            (StatusCode::OK, r#"{"name":"bot"}"#)
        } else {
            (StatusCode::UNAUTHORIZED, r#"{"error":"bad token"}"#)
        }
    }

    async fn whoami(headers: HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
            .to_string()
    }

    async fn echo(body: String) -> String {
        body
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    }

    let router = Router::new()
        .route("/api/config", get(config_endpoint))
        .route("/api/whoami", get(whoami))
        .route("/api/echo", post(echo))
        .route("/api/slow", get(slow));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn spawn_proxy(config: Config) -> String {
    let state = AppState::new(&config).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().cookie_store(true).build().unwrap()
}

async fn login(client: &reqwest::Client, base: &str, token: &str) -> reqwest::Response {
    client
        .post(format!("{}/login", base))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn full_login_proxy_logout_flow() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("flow", &upstream)).await;
    let client = client();

    // Login issues a cookie and the CSRF token.
    let response = login(&client, &proxy, VALID_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("proxy_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=3600"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Login successful");
    let csrf_token = body["csrf_token"].as_str().unwrap().to_string();
    assert!(!csrf_token.is_empty());

    // The raw credential is injected server-side; the client's own
    // Authorization header never reaches the upstream.
    let response = client
        .get(format!("{}/api/whoami", proxy))
        .header("Authorization", "Bearer attacker-supplied")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), VALID_TOKEN);

    // Unsafe methods need the CSRF header.
    let response = client
        .post(format!("{}/api/echo", proxy))
        .body("hello world")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{}/api/echo", proxy))
        .header("X-CSRF-Token", "wrong-token")
        .body("hello world")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{}/api/echo", proxy))
        .header("X-CSRF-Token", &csrf_token)
        .body("hello world")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello world");

    // Logout invalidates the session.
    let response = client.post(format!("{}/logout", proxy)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/whoami", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_input_validation() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("validation", &upstream)).await;
    let client = client();

    // Wrong method.
    let response = client.get(format!("{}/login", proxy)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Malformed JSON.
    let response = client
        .post(format!("{}/login", proxy))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty token.
    let response = login(&client, &proxy, "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing Bearer prefix.
    let response = login(&client, &proxy, "raw-token-no-prefix").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Well-formed but invalid credential.
    let response = login(&client, &proxy, "Bearer wrong-credential").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn login_rate_limit_rejects_after_max_failures() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("ratelimit", &upstream)).await;
    let client = client();

    for _ in 0..5 {
        let response = login(&client, &proxy, "Bearer wrong-credential").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Threshold reached: even a valid credential is refused unchecked.
    let response = login(&client, &proxy, VALID_TOKEN).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("retry-after").unwrap(), "60");
}

#[tokio::test]
async fn successful_login_resets_the_rate_limit_counter() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("ratereset", &upstream)).await;
    let client = client();

    for _ in 0..4 {
        let response = login(&client, &proxy, "Bearer wrong-credential").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = login(&client, &proxy, VALID_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    // A fresh window: five more failures before the limiter trips again.
    for _ in 0..5 {
        let response = login(&client, &proxy, "Bearer wrong-credential").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = login(&client, &proxy, "Bearer wrong-credential").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn proxied_paths_require_a_session() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("noauth", &upstream)).await;
    let plain = reqwest::Client::new();

    let response = plain
        .get(format!("{}/api/whoami", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A forged cookie value is rejected with the same generic 401.
    for forged in ["proxy_session=deadbeefdeadbeefdead10", "proxy_session=../../etc"] {
        let response = plain
            .get(format!("{}/api/whoami", proxy))
            .header("Cookie", forged)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn health_is_open() {
    let upstream = spawn_upstream().await;
    let proxy = spawn_proxy(test_config("health", &upstream)).await;

    let response = reqwest::get(format!("{}/health", proxy)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_timeout_maps_to_gateway_timeout() {
    let upstream = spawn_upstream().await;
    let mut config = test_config("timeout", &upstream);
    config.upstream_timeout = Duration::from_millis(300);
    let proxy = spawn_proxy(config).await;
    let client = client();

    let response = login(&client, &proxy, VALID_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/slow", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn unreachable_upstream_maps_to_bad_gateway() {
    let upstream = spawn_upstream().await;
    let config = test_config("badgateway", &upstream);
    let proxy = spawn_proxy(config.clone()).await;
    let client = client();

    let response = login(&client, &proxy, VALID_TOKEN).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Second proxy instance shares the session directory and key but points
    // at a dead upstream; the persisted session is reloaded from disk.
    let mut dead_config = config;
    dead_config.upstream_api_url = "http://127.0.0.1:1".to_string();
    let dead_proxy = spawn_proxy(dead_config).await;

    let response = client
        .get(format!("{}/api/whoami", dead_proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
