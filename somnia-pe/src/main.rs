//! Playback Engine (somnia-pe) - Main entry point
//!
//! This is the dream-book narration service for Somnia: it mounts a book,
//! narrates it page by page via an external TTS collaborator, keeps a
//! per-page ambient soundscape running, and exposes an HTTP/SSE control
//! interface.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use somnia_pe::api::{create_router, AppContext};
use somnia_pe::audio::device::RodioDeviceFactory;
use somnia_pe::config::Config;
use somnia_pe::db;
use somnia_pe::db::settings::PreferenceStore;
use somnia_pe::remote::{HttpAmbienceFetcher, HttpNarrationBackend};
use somnia_pe::state::SharedState;

/// Command-line arguments for somnia-pe
#[derive(Parser, Debug)]
#[command(name = "somnia-pe")]
#[command(about = "Dream book playback engine for Somnia")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5850", env = "SOMNIA_PE_PORT")]
    port: u16,

    /// Data directory (preferences database)
    #[arg(short, long, env = "SOMNIA_DATA_DIR")]
    data_dir: Option<String>,

    /// Base URL of the narration synthesis collaborator
    #[arg(long, default_value = "http://localhost:5860", env = "SOMNIA_TTS_URL")]
    tts_url: String,

    /// Page turn animation duration in milliseconds
    #[arg(long, default_value = "800", env = "SOMNIA_PAGE_TURN_MS")]
    page_turn_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "somnia_pe=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let data_dir =
        somnia_common::config::resolve_data_dir(args.data_dir.as_deref(), "SOMNIA_DATA_DIR")
            .context("Failed to resolve data directory")?;
    let config = Config::new(data_dir, args.port, args.tts_url, args.page_turn_ms);

    info!("Starting Somnia Playback Engine on {}", config.bind_addr);
    info!("Data directory: {}", config.data_dir.display());
    info!("Narration collaborator: {}", config.tts_base_url);

    // Open the preferences database
    let db_pool = db::init_db(&config.db_path)
        .await
        .context("Failed to open preferences database")?;
    let prefs = PreferenceStore::new(db_pool.clone());

    // Shared state and collaborators
    let state = Arc::new(SharedState::new());
    let ctx = AppContext {
        state,
        db_pool,
        prefs,
        narration_backend: Arc::new(HttpNarrationBackend::new(config.tts_base_url.clone())),
        ambience_fetcher: Arc::new(HttpAmbienceFetcher::new()),
        device_factory: Arc::new(RodioDeviceFactory),
        session: Arc::new(RwLock::new(None)),
        config: config.clone(),
    };

    let app = create_router(ctx.clone());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .context("Invalid bind address")?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Tear down any mounted session so audio stops before exit
    if let Some(controller) = ctx.session.write().await.take() {
        controller.shutdown().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
