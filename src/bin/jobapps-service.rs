//! jobapps service entry point.
//!
//! Opens the application database and blob bucket, then serves client
//! requests until Ctrl-C.
//!
//! # Usage
//!
//! ```sh
//! JOBAPPS_DATA_DIR=/var/lib/jobapps BUCKET_NAME=applications jobapps-service
//! ```
//!
//! Logs are written to `<data_dir>/logs/jobapps-service.log`.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_appender::non_blocking::WorkerGuard;

use jobapps::ipc::IpcServer;
use jobapps::service::{Service, ServiceConfig};

/// Initialize tracing with file appender for service logging.
///
/// The returned guard must stay alive for buffered log lines to be flushed.
fn init_logging(config: &ServiceConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let log_dir = config.log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", log_dir, e);
        // Fall back to stderr logging
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    // Set up daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "jobapps-service.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false) // No ANSI colors in log files
        .init();

    tracing::info!("Logging initialized to {:?}", log_dir);
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("Failed to load configuration")?;
    let _guard = init_logging(&config);

    tracing::info!("jobapps service v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded configuration: data_dir={:?}", config.data_dir);

    let service = Arc::new(Service::open(&config).context("Failed to open stores")?);
    let server = IpcServer::bind(&config.listen_addr, service)
        .await
        .context("Failed to start IPC server")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    server.run(shutdown_rx).await?;
    tracing::info!("Service stopped");
    Ok(())
}
