use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use fireworks_hub::{FileAssetResolver, HubHandle, HubMetrics};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod ws;

use crate::config::{Profile, ServerConfig, load_config};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "fireworks")]
#[command(about = "Shared fireworks display over WebSockets")]
struct Cli {
    /// Directory holding fireworks.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Configuration preset
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let index = state.config.static_dir.join("index.html");
    let cors = if state.config.check_origin {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    };

    Router::new()
        .route_service("/", ServeFile::new(&index))
        .route_service("/fireworks", ServeFile::new(&index))
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors)
        .with_state(state)
}

fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let default_directive = if debug {
        "fireworks=debug,fireworks_hub=debug,tower_http=debug,info"
    } else {
        "fireworks=info,fireworks_hub=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let (stdout_layer, file_layer) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(env_filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config: config::FileConfig = load_config(&cli.config_dir, cli.profile.as_ref())
        .extract()
        .context("Failed to load configuration")?;
    let config = ServerConfig::from_file(&file_config)?
        .with_overrides(cli.host.as_deref(), cli.port)?;

    init_logging(cli.debug, config.log_file.as_deref())?;

    info!(
        profile = ?file_config.profile,
        check_origin = config.check_origin,
        assets = %config.assets_dir.display(),
        "Starting fireworks"
    );

    let resolver = Arc::new(FileAssetResolver::with_default(
        &config.assets_dir,
        &config.default_asset,
    ));
    let metrics = Arc::new(HubMetrics::new());
    let hub = HubHandle::spawn_with_metrics(config.hub.clone(), resolver, metrics);

    let addr = config.addr;
    let app = build_router(AppState {
        hub,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("Fireworks listening on http://{}", actual_addr);
    info!("  GET /fireworks - display page");
    info!("  GET /ws        - WebSocket");
    info!("  GET /health    - health summary");
    info!("  GET /metrics   - hub counters");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
