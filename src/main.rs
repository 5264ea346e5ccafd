//! Paged Journal - demo server
//!
//! Serves a synthetic, continuously growing journal through the paged cache.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paged_journal::api::{create_router, AppState};
use paged_journal::{
    spawn_append_task, spawn_journal_owner, spawn_poll_ticker, Config, GuardedProvider,
    MemoryJournal, TailFollower,
};

/// Records the demo journal starts with
const SEED_RECORDS: usize = 2_000;

/// Main entry point for the paged journal server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Seed the in-memory journal and wrap it in a lock-guarded provider
/// 4. Spawn the journal owner, the tail poll ticker and the demo appender
/// 5. Serve the HTTP API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paged_journal=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Paged Journal server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: page_size={}, page_timeout={}ms, reload_timeout={}ms, port={}",
        config.page_size, config.page_timeout_ms, config.reload_timeout_ms, config.server_port
    );

    let mut journal = MemoryJournal::with_records(SEED_RECORDS);
    if config.lookahead_count {
        info!("Journal reports look-ahead counts");
        journal = journal.with_lookahead(config.page_size);
    }
    let journal = Arc::new(journal);
    let provider = Arc::new(GuardedProvider::new(journal.clone()));
    let tail = TailFollower::new(provider, config.cache_options(), Handle::current())?;
    info!("Journal seeded with {} records", journal.len());

    let (handle, owner) = spawn_journal_owner(tail);
    let mut background = vec![spawn_poll_ticker(
        handle.clone(),
        config.tail_poll_interval(),
    )];
    if config.append_interval_ms > 0 {
        background.push(spawn_append_task(
            journal,
            std::time::Duration::from_millis(config.append_interval_ms),
        ));
    }
    info!("Background tasks started");

    let app = create_router(AppState::new(handle));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await?;

    // The router held the last handles; the owner exits once they are gone.
    if owner.await.is_err() {
        warn!("Journal owner did not stop cleanly");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the background
/// tasks.
async fn shutdown_signal(background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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

    for task in background {
        task.abort();
    }
    warn!("Background tasks aborted");
}
