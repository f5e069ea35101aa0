use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use server::config::ServerConfig;
use server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting drum-hit estimation server...");

    let config = ServerConfig::from_env();

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.plot_dir).await?;

    info!(
        "Server configuration loaded: port={}, estimator={:?}, max_upload={} bytes, rate_limit={}/min",
        config.port, config.estimator, config.max_upload_bytes, config.rate_limit_per_minute
    );

    let state = AppState::new(config.clone());
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
