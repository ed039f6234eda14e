use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use botproxy::config::Config;
use botproxy::routes::app;
use botproxy::services::session::CLEANUP_INTERVAL;
use botproxy::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(&config)?;

    // Both background sweeps share one token so graceful shutdown stops them
    // together with the server.
    let cancel = CancellationToken::new();
    let session_sweep = state
        .sessions
        .clone()
        .spawn_cleanup_task(CLEANUP_INTERVAL, cancel.clone());
    let limiter_sweep = state
        .login_limiter
        .clone()
        .spawn_cleanup_task(config.rate_limit_window, cancel.clone());
    tracing::info!("Background cleanup tasks started");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Proxy listening on http://{}", addr);

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        }
    };

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    cancel.cancel();
    let _ = session_sweep.await;
    let _ = limiter_sweep.await;
    tracing::info!("Proxy stopped");

    Ok(())
}
