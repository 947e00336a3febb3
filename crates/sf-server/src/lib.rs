//! sf-server: HTTP API server, background worker pool, and bootstrap.
//!
//! This crate ties together all other sf-* crates into a running service.
//! It provides:
//!
//! - Axum-based HTTP API for uploads, video jobs, results and SSE events
//! - Worker pool that leases `generate_video` tasks and runs the orchestrator
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use sf_av::{ProcessRunner, ToolRegistry, ToolRunner};
use sf_core::config::Config;
use sf_core::events::EventBus;
use sf_db::DbPool;
use sf_storage::FsBlobStore;
use tokio_util::sync::CancellationToken;

pub use crate::context::AppContext;
pub use crate::router::build_router;

/// Assemble an [`AppContext`] from already-initialized parts.
pub fn build_context(
    config: Config,
    db: DbPool,
    tools: ToolRegistry,
    runner: Arc<dyn ToolRunner>,
) -> AppContext {
    let blobs = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    AppContext {
        db,
        config: Arc::new(config),
        event_bus: Arc::new(EventBus::default()),
        tools: Arc::new(tools),
        runner,
        blobs,
    }
}

/// Open the database, discover tools, and build the production context.
pub fn init_context(config: Config) -> sf_core::Result<AppContext> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db = sf_db::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }

    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    Ok(build_context(config, db, tools, Arc::new(ProcessRunner)))
}

/// Start the API server and the worker pool.
///
/// Returns when a shutdown signal is received; in-flight jobs are allowed to
/// finish their current attempt before the worker pool exits.
pub async fn start(config: Config) -> sf_core::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| sf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = init_context(config)?;
    let cancel = CancellationToken::new();

    let workers = tokio::spawn(worker::run_workers(ctx.clone(), cancel.clone()));

    let app = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| sf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    if let Err(e) = workers.await {
        tracing::error!("Worker pool task failed: {e}");
    }

    serve_result.map_err(|e| sf_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Run only the worker pool, without the HTTP API.
pub async fn run_worker_only(config: Config) -> sf_core::Result<()> {
    let ctx = init_context(config)?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_cancel.clone()).await;
        signal_cancel.cancel();
    });

    worker::run_workers(ctx, cancel).await;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
