mod config;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use tavern_api::auth::{AppState, AppStateInner};
use tavern_api::session::SessionConfig;
use tavern_api::views::Views;

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "tavern_server=debug,tavern_api=debug,tavern_db=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    let db = tavern_db::Database::open(&config.db_path)?;
    let views = Views::new()?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        session: SessionConfig {
            secret: config.session_secret.clone(),
            ttl_hours: config.session_hours,
            secure: config.is_production(),
        },
        views,
    });

    let app = tavern_api::router(state).layer(TraceLayer::new_for_http());

    info!(env = ?config.environment, "Tavern listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tavern stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_names_workspace_crates() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for directive in DEFAULT_LOG_FILTER.split(',') {
            let target = directive.split('=').next().unwrap_or_default();
            assert!(
                ["tavern_server", "tavern_api", "tavern_db", "tower_http"].contains(&target),
                "unexpected target {target}"
            );
        }
    }
}
