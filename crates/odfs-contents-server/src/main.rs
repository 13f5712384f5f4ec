//! Jupyter contents REST API over a OnedataFS mount.
//!
//! This server:
//! - Serves content models of files, notebooks and directories under /api/contents
//! - Saves, renames, copies and deletes entries on the mounted space
//! - Keeps per-file checkpoints in a hidden directory next to each file

use std::sync::Arc;

use clap::Parser;
use odfs_contents_local::LocalFs;
use odfs_contents_manager::ContentsManager;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;

use config::Config;
use handlers::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!(
        "Starting odfs-contents-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Root: {}", config.effective_root().display());
    info!("  Checkpoint dir: {}", config.checkpoint_dir);
    info!("  Truncate file writes: {}", config.truncate_file_writes);
    if config.signing_secret.is_none() {
        warn!("  Signing: DISABLED (no secret configured, notebooks stay untrusted)");
    }

    let fs = LocalFs::new(config.local_fs_config())?;
    let manager = ContentsManager::new(Arc::new(fs), config.manager_config())?;

    let state = AppState {
        manager: Arc::new(manager),
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, initiating shutdown");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
