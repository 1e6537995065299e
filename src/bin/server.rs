//! kvlog Server Binary
//!
//! Replays the journal and serves the store over HTTP.
//!
//! Settings are merged as: flags > environment > config file > defaults.
//! Ctrl+C or SIGTERM stops the listener and drains the journal before exit.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kvlog::config::{BackendKind, ConfigBuilder};
use kvlog::{Config, KvStore, Store};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// kvlog Server
#[derive(Parser, Debug)]
#[command(name = "kvlog-server")]
#[command(about = "Crash-recoverable key-value store over HTTP")]
#[command(version)]
struct Args {
    /// JSON config file
    #[arg(short, long, env = "KVLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Journal backend (file, sqlite)
    #[arg(short, long, env = "KVLOG_BACKEND")]
    backend: Option<BackendKind>,

    /// Journal file for the file backend
    #[arg(long, env = "KVLOG_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Database file for the sqlite backend
    #[arg(long, env = "KVLOG_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(short, long, env = "KVLOG_LISTEN")]
    listen: Option<String>,

    /// Give up on a write if the journal has not accepted it within this many ms
    #[arg(long, env = "KVLOG_ACCEPT_TIMEOUT_MS")]
    accept_timeout_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> kvlog::Result<Config> {
        let base = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        let mut builder = ConfigBuilder::from_config(base);
        if let Some(kind) = self.backend {
            builder = builder.backend(kind);
        }
        if let Some(path) = self.log_path {
            builder = builder.log_path(path);
        }
        if let Some(path) = self.sqlite_path {
            builder = builder.sqlite_path(path);
        }
        if let Some(addr) = self.listen {
            builder = builder.listen_addr(addr);
        }
        if let Some(ms) = self.accept_timeout_ms {
            builder = builder.accept_timeout_ms(ms);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    tracing::info!("kvlog Server v{}", kvlog::VERSION);
    tracing::info!("Backend: {}", config.backend);
    tracing::info!("Listen address: {}", config.listen_addr);

    // Replay happens here; refuse to serve from an unvalidated map
    let store = match KvStore::open(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        keys = store.len(),
        last_sequence = store.last_sequence(),
        "Store initialized successfully"
    );

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen_addr, e);
            close_store(&store);
            std::process::exit(1);
        }
    };

    let shared: Arc<dyn Store> = store.clone();
    if let Err(e) = kvlog::http::serve(listener, shared, shutdown_signal()).await {
        tracing::error!("Server error: {}", e);
        close_store(&store);
        std::process::exit(1);
    }

    close_store(&store);
    tracing::info!("Server stopped");
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Drain the journal so every accepted write reaches the backend
fn close_store(store: &KvStore) {
    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
    }
}
