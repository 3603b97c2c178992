//! Transaction pipeline runner
//!
//! Loads the configured transfers, submits them through the pipeline and logs
//! each receipt as it arrives.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use tx_pipeline::metrics::MetricsServer;
use tx_pipeline::{Settings, TransactionFields, TransactionManager};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting tx-pipeline v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration with {} transfers for {}",
        settings.transfers.len(),
        settings.node.rpc_url
    );

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let manager = Arc::new(TransactionManager::connect(&settings)?);

    let run = {
        let manager = manager.clone();
        let transfers = settings.transfers.clone();
        async move {
            let mut pending = Vec::with_capacity(transfers.len());
            for transfer in transfers {
                let fields = TransactionFields::transfer(transfer.to, transfer.value);
                match manager.submit(transfer.from, fields).await {
                    Ok(handle) => pending.push(handle),
                    Err(e) => error!("Transfer from {:?} not accepted: {}", transfer.from, e),
                }
            }

            for result in join_all(pending).await {
                match result {
                    Ok(confirmation) if confirmation.succeeded() => info!(
                        "Transfer {:?} (nonce {}) succeeded in block {:?}",
                        confirmation.tx_hash,
                        confirmation.nonce,
                        confirmation.block_number()
                    ),
                    Ok(confirmation) => warn!(
                        "Transfer {:?} (nonce {}) reverted",
                        confirmation.tx_hash, confirmation.nonce
                    ),
                    Err(e) => error!("Transfer failed: {}", e),
                }
            }
        }
    };

    tokio::select! {
        _ = run => info!("All transfers processed"),
        _ = shutdown_signal() => info!("Shutdown signal received, stopping..."),
    }

    // Graceful shutdown
    manager.shutdown(true).await;
    if let Some(e) = manager.watcher_failure() {
        warn!("Pipeline stopped after a confirmation failure: {}", e);
    }

    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("tx-pipeline stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tx_pipeline=debug,hyper=warn,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
