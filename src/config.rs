use anyhow::{Context, Result};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The port the proxy listens on.
    pub port: u16,
    /// The base URL of the upstream bot API.
    pub upstream_api_url: String,
    /// The fixed session lifetime (absolute expiry, not rolling).
    pub session_timeout: Duration,
    /// The directory holding one encrypted record per session.
    pub sessions_dir: PathBuf,
    /// The path of the session encryption key file.
    pub session_key_file: PathBuf,
    /// The login rate-limit window.
    pub rate_limit_window: Duration,
    /// The maximum login failures per window.
    pub rate_limit_max_attempts: u32,
    /// The timeout applied to each forwarded upstream request.
    pub upstream_timeout: Duration,
    /// Whether session cookies carry the `Secure` flag. Explicit because the
    /// request scheme is unreliable behind a terminating reverse proxy.
    pub https_mode: bool,
    /// The path scope of the session cookie.
    pub cookie_path: String,
    /// Proxy addresses whose X-Forwarded-For header is honored.
    pub trusted_proxies: Vec<IpAddr>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// Missing required values fail here, at startup, not at first request.
    pub fn from_env() -> Result<Self> {
        let upstream_api_url = env::var("UPSTREAM_API_URL")
            .context("UPSTREAM_API_URL must be set (base URL of the upstream bot API)")?;
        let upstream_api_url = upstream_api_url.trim_end_matches('/').to_string();

        let trusted_proxies = match env::var("TRUSTED_PROXIES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>()
                        .with_context(|| format!("Invalid TRUSTED_PROXIES entry: {}", s))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            port: env_or("PROXY_PORT", 8080)?,
            upstream_api_url,
            session_timeout: Duration::from_secs(env_or("SESSION_TIMEOUT_SECS", 14_400u64)?),
            sessions_dir: PathBuf::from(
                env::var("SESSIONS_DIR").unwrap_or_else(|_| "sessions".to_string()),
            ),
            session_key_file: PathBuf::from(
                env::var("SESSION_KEY_FILE").unwrap_or_else(|_| ".session_key".to_string()),
            ),
            rate_limit_window: Duration::from_secs(env_or("RATE_LIMIT_WINDOW_SECS", 60u64)?),
            rate_limit_max_attempts: env_or("RATE_LIMIT_MAX_ATTEMPTS", 5u32)?,
            upstream_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 10u64)?),
            https_mode: env_or("HTTPS_MODE", false)?,
            cookie_path: env::var("COOKIE_PATH").unwrap_or_else(|_| "/".to_string()),
            trusted_proxies,
        })
    }
}
