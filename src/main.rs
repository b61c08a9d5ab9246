//! Event Aggregator - Binary Entry Point
//!
//! Startup: tracing → config → store → pipeline → HTTP server.
//! Shutdown: stop accepting requests → drain the worker → close the store.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use event_aggregator::api::{create_router, AppState};
use event_aggregator::utils::init_tracing;
use event_aggregator::{AggregatorConfig, AggregatorResult, Pipeline, SqliteDedupStore};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Aggregator exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AggregatorResult<()> {
    let config = AggregatorConfig::from_env()?;
    info!(
        version = event_aggregator::VERSION,
        database = %config.database_path.display(),
        bind = %config.bind_addr,
        "Starting event aggregator"
    );

    // Store initialization failure is fatal
    let store = SqliteDedupStore::open(&config.database_path, config.max_connections).await?;
    info!(path = %store.path().display(), "Dedup store ready");
    let pipeline = Pipeline::start(Arc::new(store), &config.pipeline);
    let state = Arc::new(AppState::new(pipeline));

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "HTTP server listening");

    axum::serve(listener, create_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining pipeline");
    let report = state.pipeline.shutdown().await;
    if report.abandoned > 0 {
        info!(abandoned = report.abandoned, "Queued events dropped at shutdown");
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl+c");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
