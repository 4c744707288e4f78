mod config;
mod error;
mod handlers;
mod logging;
mod routes;
mod state;


use anyhow::{Context, Result};
use categorizer_storage::{create_db, create_memory_db, seed_default_categories};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;
    logging::init(config.log_format);

    let db = if config.in_memory() {
        tracing::warn!("Using an in-memory database; data is lost on shutdown");
        create_memory_db().await?
    } else {
        create_db(&config.database_path)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_path.display()))?
    };
    if config.seed_categories {
        seed_default_categories(&db).await?;
    }

    let bind = config.bind;
    let app = routes::build_router(AppState::new(db.clone(), config));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("Categorizer API listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Categorizer API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
