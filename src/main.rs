//! obs-access-signer -- access-signing redirect gateway.
//!
//! Answers GET/HEAD for an object path with a redirect to a freshly
//! signed URL on the backing store. SIGTERM/SIGINT stop accepting
//! connections and wait for in-flight requests with a timeout before
//! exiting.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(
    name = "obs-access-signer",
    version,
    about = "Access-signing redirect gateway for private object-storage buckets"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "obs-access-signer.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = obs_access_signer::config::load_config(&cli.config)?;

    // Initialize tracing / logging. RUST_LOG wins over the configured level
    // when both are set.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    if config.observability.metrics {
        obs_access_signer::metrics::init_metrics();
        obs_access_signer::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Resolve the signing backend by name. Unknown or duplicate names are
    // startup failures, not per-request errors.
    let registry = obs_access_signer::backend::BackendRegistry::builtin()?;
    let backend = registry.init(&config.gateway.backend, &config).await?;

    info!(
        "redirect policy: code={} url_expiry_secs={} secure={} host_redirect='{}' remove_bucket_prefix={}",
        config.gateway.redirect_code,
        config.gateway.url_expiry_secs,
        config.gateway.redirect_secure,
        config.gateway.host_redirect,
        config.gateway.remove_bucket_prefix
    );

    let state = Arc::new(obs_access_signer::AppState {
        config: config.clone(),
        backend,
    });

    let app = obs_access_signer::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("obs-access-signer listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout))
        .await?;

    info!("obs-access-signer shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful
/// shutdown. A watchdog hard-exits the process if draining in-flight
/// requests outlives the configured timeout.
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("graceful shutdown timed out after {timeout_secs}s, exiting");
        std::process::exit(1);
    });
}
