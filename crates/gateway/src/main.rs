use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use rl_domain::config::Config;
use rl_gateway::api;
use rl_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development convenience; real deployments set the environment.
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let bind_addr = config.server.bind_addr();

    let state = AppState::initialise(config).context("failed to initialise application state")?;

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "ragline listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("ragline stopped");
    Ok(())
}

/// Structured JSON logs, `RUST_LOG` overridable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rl_gateway=debug")),
        )
        .json()
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
