use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};
use upscaler::config::LogFormat;
use upscaler::{load_config_from_env, Config, ConfigError, JobManager, UpscalerError};

mod api;
mod state;

use state::AppState;

#[derive(Error, Debug)]
enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upscaler(#[from] UpscalerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Worker shutdown failed: {0}")]
    Shutdown(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("upscaler-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = load_config_from_env()?;
    init_tracing(&config)?;

    tracing::info!("Starting upscaler server...");

    let addr = config.bind_addr.clone();
    let manager = Arc::new(JobManager::start(config)?);
    let app = api::create_router(AppState::new(Arc::clone(&manager)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    // Joining workers blocks until running jobs finish.
    tokio::task::spawn_blocking(move || manager.shutdown()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Routes `log` records into tracing and installs a text or JSON formatter.
/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &Config) -> Result<(), ServerError> {
    LogTracer::init().map_err(|e| ServerError::Tracing(e.to_string()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(fmt::layer().json())),
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    }
    .map_err(|e| ServerError::Tracing(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
