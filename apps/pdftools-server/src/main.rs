//! pdftools Server
//!
//! HTTP front end for the pdftools engine. Provides REST API endpoints for:
//!
//! - Merging several PDFs into one
//! - Splitting a PDF by page range
//! - Recompressing a PDF
//! - Validating uploads and extracting document info
//!
//! ## Architecture
//!
//! Uploads are spooled to temporary files owned by a per-request guard.
//! Each job runs on the blocking thread pool under a wall-clock timeout;
//! when the timeout fires the job's cancellation token is tripped so the
//! worker stops at its next page boundary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use pdftools_core::{Engine, EngineConfig, SizeLimits};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{
    handle_compress, handle_health, handle_info, handle_merge, handle_split, handle_validate,
    handle_validate_merge,
};

const MIB: u64 = 1024 * 1024;

/// Command-line arguments for the pdftools server
#[derive(Parser, Debug)]
#[command(name = "pdftools-server")]
#[command(about = "HTTP server for PDF merge, split, compress, validate and info")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PDFTOOLS_PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "PDFTOOLS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Maximum size of a single uploaded file, in MiB
    #[arg(long, env = "PDFTOOLS_MAX_UPLOAD_MB", default_value = "50")]
    max_upload_mb: u64,

    /// Maximum size of a whole request body, in MiB
    #[arg(long, env = "PDFTOOLS_MAX_BODY_MB", default_value = "200")]
    max_body_mb: u64,

    /// Maximum number of partitions processed per split
    #[arg(long, env = "PDFTOOLS_MAX_PARTITIONS", default_value = "10")]
    max_partitions: usize,

    /// Job timeout in milliseconds (0 disables it)
    #[arg(long, env = "PDFTOOLS_JOB_TIMEOUT_MS", default_value = "30000")]
    job_timeout_ms: u64,

    /// Maximum pages copied per job (0 disables it)
    #[arg(long, env = "PDFTOOLS_MAX_JOB_PAGES", default_value = "5000")]
    max_job_pages: usize,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "PDFTOOLS_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Directory for spooled uploads (defaults to the system temp dir)
    #[arg(long, env = "PDFTOOLS_SPOOL_DIR")]
    spool_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            limits: SizeLimits::uniform(self.max_upload_mb * MIB),
            max_partitions: self.max_partitions,
            max_job_pages: self.max_job_pages,
            job_timeout_ms: self.job_timeout_ms,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Where uploads are spooled; `None` means the system temp dir
    pub spool_dir: Option<PathBuf>,
    /// Request body ceiling in bytes
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(Engine::new(config)),
            spool_dir: None,
            max_body_bytes: 200 * MIB as usize,
        }
    }
}

/// All routes and middleware except rate limiting, which needs the peer
/// address only a real listener provides.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // API endpoints
        .route("/api/merge", post(handle_merge))
        .route("/api/validate-merge", post(handle_validate_merge))
        .route("/api/validate", post(handle_validate))
        .route("/api/split", post(handle_split))
        .route("/api/compress", post(handle_compress))
        .route("/api/info", post(handle_info))
        // Apply middleware
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdftools server on {}:{}", args.host, args.port);

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .context("Failed to create rate limiter config")?,
    );

    if let Some(dir) = &args.spool_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create spool dir {}", dir.display()))?;
    }

    let state = AppState {
        engine: Arc::new(Engine::new(args.engine_config())),
        spool_dir: args.spool_dir.clone(),
        max_body_bytes: usize::try_from(args.max_body_mb * MIB)
            .context("Body limit does not fit in memory")?,
    };

    let app = build_router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!(
        "Upload limit: {} MiB per file, {} MiB per request",
        args.max_upload_mb, args.max_body_mb
    );
    info!("Job timeout: {}ms", args.job_timeout_ms);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
