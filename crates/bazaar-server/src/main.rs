mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bazaar_api::storage::Storage;
use bazaar_api::sweep::run_feature_sweep;
use bazaar_api::{AppState, AppStateInner};
use bazaar_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar=debug,bazaar_api=debug,bazaar_gateway=debug,bazaar_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = bazaar_db::Database::open(&config.db_path)?;
    let storage = Storage::new(config.storage_dir.clone(), &config.public_url).await?;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        dispatcher: Dispatcher::new(),
        storage,
        jwt_secret: config.jwt_secret.clone(),
        email_domain: config.email_domain.clone(),
    });

    tokio::spawn(run_feature_sweep(state.clone(), config.feature_sweep_secs));

    let app = bazaar_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Bazaar server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
