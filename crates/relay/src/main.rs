mod api;
mod config;
mod preamble;
mod upstream;

use anyhow::Context;
use config::RelayServerConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,localchat_relay=debug".into()),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cfg = RelayServerConfig::load()?;
    tracing::info!(target: "relay", "relaying to model server at {}", cfg.model_url);

    let state = Arc::new(api::AppState::from_config(&cfg));
    let app = api::router(state).layer(api::cors_layer(&cfg.allowed_origins));

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(target: "relay", "API on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;
    Ok(())
}
