use std::sync::Arc;

use crate::config::Config;
use crate::services::rate_limit::RateLimiter;
use crate::services::session::SessionStore;
use crate::services::upstream::UpstreamClient;

/// The application's state, shared by handlers and middleware.
///
/// The session store and login rate limiter are the only mutable shared
/// pieces; both are explicitly constructed here and injected, with their
/// background tasks owned by the server lifecycle rather than process init.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The encrypted session store.
    pub sessions: Arc<SessionStore>,
    /// The fixed-window login rate limiter.
    pub login_limiter: Arc<RateLimiter>,
    /// The upstream bot API client.
    pub upstream: Arc<UpstreamClient>,
}

impl AppState {
    /// Creates a new `AppState`: loads/generates the encryption key, replays
    /// persisted sessions, and builds the limiter and upstream client.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let sessions = SessionStore::new(
            &config.sessions_dir,
            &config.session_key_file,
            config.session_timeout,
        )?;
        tracing::info!("Session store initialized at {}", config.sessions_dir.display());

        let login_limiter = RateLimiter::new(
            config.rate_limit_window,
            config.rate_limit_max_attempts,
        );

        let upstream = UpstreamClient::new(&config.upstream_api_url, config.upstream_timeout)?;
        tracing::info!("Upstream client targeting {}", config.upstream_api_url);

        Ok(AppState {
            config: config.clone(),
            sessions: Arc::new(sessions),
            login_limiter: Arc::new(login_limiter),
            upstream: Arc::new(upstream),
        })
    }
}
