//! sr-server: HTTP API for render admission, job status, and events.
//!
//! This crate ties the sr-* crates into a running server:
//!
//! - Axum API for submitting renders and polling jobs, with SSE events
//! - Local artifact serving under `/media`
//! - Startup recovery of jobs orphaned by a previous process
//! - Graceful shutdown that lets running renders finish

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sr_av::{ToolRegistry, Workspace};
use sr_core::config::Config;

use crate::context::AppContext;

/// Start the storyreel server.
///
/// Opens the database, sweeps scratch left by a dead process, fails jobs it
/// orphaned, then serves until SIGINT or SIGTERM. Running renders are
/// allowed to finish before returning.
pub async fn start(config: Config) -> sr_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    let db = sr_db::pool::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }

    let swept = Workspace::sweep_stale(&config.render.scratch_dir)?;
    if swept > 0 {
        tracing::info!("Removed {swept} stale scratch directories");
    }

    let tools = Arc::new(ToolRegistry::discover(
        &config.tools,
        Duration::from_secs(config.render.tool_timeout_secs),
    ));
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

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| sr_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::build(db, config, tools)?;

    let orphans = ctx.scheduler.recover_orphans().await?;
    if orphans > 0 {
        tracing::warn!("Failed {orphans} renders interrupted by the previous shutdown");
    }

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| sr_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| sr_core::Error::Internal(format!("Server error: {e}")))?;

    let running = ctx.scheduler.running();
    if running > 0 {
        tracing::info!("Waiting for {running} running renders to finish");
    }
    ctx.scheduler.drain().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
    }

    tracing::info!("Shutdown signal received");
}
