mod cleanup;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use clipsync_api::auth::{AppState, AppStateInner};
use clipsync_api::config::Config;
use clipsync_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipsync_server=debug,clipsync_api=debug,clipsync_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.has_placeholder_secret() {
        eprintln!("FATAL: CLIPSYNC_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Database::open(&config.db_path)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let pairing_ttl = config.pairing_code_ttl.num_seconds();
    let state: AppState = Arc::new(AppStateInner::new(db, config));

    tokio::spawn(cleanup::run_cleanup_loop(state.clone()));

    let app = clipsync_api::router(state);

    info!("ClipSync server listening on {}", addr);
    info!("Pairing codes expire after {} seconds", pairing_ttl);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
