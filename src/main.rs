//! Gallery -- image gallery HTTP backend.
//!
//! Startup picks the metadata store exactly once: the persistent database
//! when it opens, otherwise an in-memory store seeded with default
//! accounts. SIGTERM/SIGINT stop accepting connections and wait for
//! in-flight requests, bounded by `server.shutdown_timeout`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use gallery::config::LoggingConfig;
use gallery::media::backend::MediaBackend;

/// Command-line arguments for the gallery server.
#[derive(Parser, Debug)]
#[command(name = "gallery", version, about = "Image gallery HTTP backend")]
struct Cli {
    /// Path to the YAML configuration file. Environment variables apply
    /// on top of it (or on top of defaults when omitted).
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = gallery::config::resolve_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match &cli.config {
        Some(path) => info!("Loaded configuration from {path}"),
        None => info!("No configuration file given, using defaults and environment"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        gallery::metrics::init_metrics()?;
        gallery::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let selected = gallery::metadata::mode::select_store(&config.database).await?;

    let secret = if config.auth.jwt_secret.is_empty() {
        warn!("JWT_SECRET is not set; using a random secret, tokens will not survive a restart");
        hex::encode(rand::random::<[u8; 32]>())
    } else {
        config.auth.jwt_secret.clone()
    };
    let tokens = gallery::auth::TokenService::new(secret.as_bytes(), config.auth.token_ttl_hours);

    let staging =
        gallery::upload::UploadStaging::new(&config.upload.staging_dir, config.upload.max_file_size)?;
    info!("Upload staging directory: {}", config.upload.staging_dir);

    let media: Arc<dyn MediaBackend> = match config.media.backend.as_str() {
        "memory" => {
            info!(
                "In-memory media backend initialized at {}",
                config.media.memory_base_url
            );
            Arc::new(gallery::media::memory::MemoryMediaBackend::new(
                &config.media.memory_base_url,
                &config.media.cloudinary.folder,
            ))
        }
        "cloudinary" => Arc::new(gallery::media::cloudinary::CloudinaryBackend::new(
            &config.media.cloudinary,
        )?),
        other => anyhow::bail!("Unknown media.backend '{other}' (expected cloudinary or memory)"),
    };

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);

    let state = Arc::new(gallery::AppState {
        config,
        mode: selected.mode,
        metadata: selected.store,
        media,
        tokens,
        staging,
    });

    let app = gallery::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Gallery listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("Gallery shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT, then arm a watchdog that exits the process
/// if draining takes longer than `timeout`.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
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
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!("Graceful shutdown exceeded {timeout:?}, exiting");
        std::process::exit(1);
    });
}
