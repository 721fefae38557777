use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use meli_sync::crypto::CryptoEngine;
use meli_sync::store::PgStore;
use meli_sync::{api, AppState, Config, Gateways, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .init();

    info!("meli-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    // Initialize components
    let crypto = Arc::new(CryptoEngine::new(&config.secret_key)?);
    let store = Arc::new(PgStore::new(&config.database_url, crypto.clone()).await?);
    store.migrate().await?;
    info!("Database connected and migrated ✓");

    let gateways = Gateways::meli(&config);
    info!("MercadoLibre API at {}", config.meli_api_url);

    // Build shared state
    let state: SharedState = Arc::new(AppState::new(config.clone(), crypto, store, gateways));

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
