//! Packrat - A bounded-capacity content cache server
//!
//! Stores uploaded files under caller-chosen keys and evicts the least
//! recently used ones when the configured capacity is exceeded.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packrat::api::create_router;
use packrat::{spawn_sweep_task, AppState, Config};

/// Main entry point for the Packrat cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the storage backend and metadata store, rebuild the cache engine
/// 4. Start the background orphan sweep task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured address
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "packrat=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Packrat Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_cache_size={}, backend={}, storage_location={}, metadata_path={}, port={}, sweep_interval={}s",
        config.max_cache_size,
        config.backend,
        config.storage_location.display(),
        config.metadata_path.display(),
        config.server_port,
        config.sweep_interval
    );

    // Unknown backends and unreadable metadata stop startup here
    let state = AppState::from_config(&config).context("failed to initialise cache")?;
    info!("Cache engine initialized");

    let sweep_handle = if config.sweep_interval > 0 {
        info!("Background orphan sweep task started");
        Some(spawn_sweep_task(state.cache.clone(), config.sweep_interval))
    } else {
        info!("Periodic orphan sweep disabled");
        None
    };

    let app = create_router(state);

    let addr = SocketAddr::new(config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The sweep task holds the last engine reference once the router is gone;
    // waiting for it lets the metadata database close before exit.
    if let Some(handle) = sweep_handle {
        handle.abort();
        let _ = handle.await;
        info!("Sweep task stopped");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
