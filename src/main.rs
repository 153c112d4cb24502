//! Player Value Proxy — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.

use player_value_proxy::{api, config::Config, metrics::Metrics};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::from_env()?;
    let metrics = Metrics::init(cfg.cache_ttl.as_secs());

    let state = api::AppState::new(&cfg)?;
    let app = api::create_router(state).merge(metrics.router());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        ttl_secs = cfg.cache_ttl.as_secs(),
        endpoints = cfg.endpoints.len(),
        "player-value-proxy listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
