//! Mailburst - Campaign dispatch server entry point

use std::sync::Arc;

use anyhow::Result;
use mailburst_api::AppState;
use mailburst_common::config::Config;
use mailburst_core::{CampaignDispatcher, SmtpMailTransport, TrackingService};
use mailburst_storage::MemoryStore;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config);

    info!("Starting Mailburst campaign server...");

    let store = MemoryStore::new();
    let transport = Arc::new(SmtpMailTransport::new(config.smtp.clone()));
    let dispatcher = Arc::new(CampaignDispatcher::new(
        store.clone(),
        transport,
        config.sender.clone(),
        config.pacing.clone(),
        &config.tracking.base_url,
    ));
    let tracking = Arc::new(TrackingService::new(store.clone()));

    let state = Arc::new(AppState {
        store,
        dispatcher: dispatcher.clone(),
        tracking,
    });
    let app = mailburst_api::create_router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Cancel running dispatch loops first so interrupted campaigns are
    // paused with their records in their last-known state.
    dispatcher.shutdown().await;
    server.abort();

    info!("Mailburst shutdown complete");

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailburst=debug", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
