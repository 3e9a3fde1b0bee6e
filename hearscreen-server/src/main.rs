//! Hearing screening server (hearscreen-server) - Main entry point
//!
//! Loads configuration, opens the respondent database (or an in-memory
//! store), and serves the screening API and test client.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hearscreen_common::config::{resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use hearscreen_common::db::init_database;
use hearscreen_server::api::BuildInfo;
use hearscreen_server::db::{MemorySessionStore, SessionStore, SqliteSessionStore};
use hearscreen_server::screening::ScreeningService;
use hearscreen_server::{build_router, AppState, ToneSettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hearscreen-server
#[derive(Parser, Debug)]
#[command(name = "hearscreen-server")]
#[command(about = "Pure-tone hearing screening service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "HEARSCREEN_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1", env = "HEARSCREEN_BIND")]
    bind: IpAddr,

    /// Root folder holding the database
    #[arg(short, long, env = "HEARSCREEN_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "HEARSCREEN_CONFIG")]
    config: Option<PathBuf>,

    /// Keep sessions in memory only (nothing is written to disk)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so [logging] level can seed the filter
    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "hearscreen_server=debug,hearscreen_common={},tower_http=debug",
                    config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let build = BuildInfo::current();
    info!(
        "Starting hearscreen-server v{} [{}] built {} ({})",
        build.version, build.git_hash, build.build_timestamp, build.build_profile
    );
    match &args.config {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("Configuration: platform default location or built-in defaults"),
    }
    info!(
        "Protocol: {} frequencies, start {} dB, floor {} dB, max {} trials per cell",
        config.protocol.frequencies.len(),
        config.protocol.staircase.initial_level_db,
        config.protocol.staircase.min_level_db,
        config.protocol.staircase.max_trials
    );

    let store: Arc<dyn SessionStore> = if args.in_memory {
        warn!("Running with in-memory store; sessions are lost on shutdown");
        Arc::new(MemorySessionStore::new())
    } else {
        let root_folder = resolve_root_folder(
            args.root_folder.as_deref(),
            ROOT_FOLDER_ENV,
            config.root_folder.as_deref(),
        );
        let db_path = config.database_path(&root_folder);
        info!("Database: {}", db_path.display());

        let pool = init_database(&db_path)
            .await
            .context("Failed to initialize database")?;
        Arc::new(SqliteSessionStore::new(pool))
    };

    if config.swap_stereo_channels {
        info!("Stereo channels swapped at delivery");
    }

    let screening = Arc::new(ScreeningService::new(store, config.protocol.clone()));
    let state = AppState::new(
        screening,
        ToneSettings {
            duration_s: config.tone.duration_s,
            swap_stereo_channels: config.swap_stereo_channels,
        },
    );
    let app = build_router(state);

    let addr = SocketAddr::new(args.bind, args.port);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
