mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod provider;
mod server;
mod settlement;

#[cfg(test)]
mod testing;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::info;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting settlement reconciler");

    let config = config::Config::from_env().context("loading configuration")?;

    let state = bootstrap::initialize_app_state(&config)
        .await
        .context("initializing application state")?;

    // Create HTTP server
    let app = server::create_app(state);

    server::run_server(app, &config.bind_address)
        .await
        .with_context(|| format!("serving on {}", config.bind_address))?;

    Ok(())
}
