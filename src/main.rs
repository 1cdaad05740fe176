//! Broadcast node daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     API client
//!     ──────────▶ http (axum) ──▶ broadcast::BroadcastManager
//!                                     │ stage message + data
//!                                     ▼
//!                               batch::LocalBatchManager
//!                                     │ sealed batch + pins
//!                                     ▼
//!                           broadcast dispatch coordinator
//!                 ┌───────────────────┼────────────────────┐
//!                 ▼                   ▼                    ▼
//!         data exchange ──▶    shared storage        batchpin ──▶ ledger
//!          (blob download)      (IPFS upload)        (pinBatch tx)
//!
//!     Cross-cutting: config, observability, operations, lifecycle
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use batch_anchor::batch::{DispatcherOptions, LocalBatchManager};
use batch_anchor::batchpin::{LedgerPinSubmitter, PinBatchHandler};
use batch_anchor::blockchain::client::BlockchainClient;
use batch_anchor::blockchain::wallet::Wallet;
use batch_anchor::blockchain::EthereumBatchPin;
use batch_anchor::config::{load_config, AnchorConfig};
use batch_anchor::context::Context;
use batch_anchor::data::LocalDataManager;
use batch_anchor::identity::LocalIdentity;
use batch_anchor::lifecycle::{wait_for_signal, Shutdown};
use batch_anchor::model::OpType;
use batch_anchor::observability::{init_logging, init_metrics, Metrics, NoopMetrics, PrometheusMetrics};
use batch_anchor::operations::{OperationManager, OperationRegistry};
use batch_anchor::plugins::{Blockchain, Database, HttpDataExchange, IpfsStorage, LocalDatabase};
use batch_anchor::syncasync::LocalBridge;
use batch_anchor::{ApiServer, BroadcastManager};

#[derive(Parser)]
#[command(name = "batch-anchor")]
#[command(about = "Broadcast node: batches messages, publishes them and anchors them on chain")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AnchorConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        node = %config.node.name,
        org = %config.node.org,
        "batch-anchor starting"
    );

    let metrics: Arc<dyn Metrics> = if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => match init_metrics(addr) {
                Ok(()) => Arc::new(PrometheusMetrics),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                    Arc::new(NoopMetrics)
                }
            },
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
                Arc::new(NoopMetrics)
            }
        }
    } else {
        Arc::new(NoopMetrics)
    };

    // Plugins
    let database: Arc<dyn Database> = match &config.database.path {
        Some(path) => Arc::new(LocalDatabase::open(path)?),
        None => Arc::new(LocalDatabase::in_memory()),
    };
    let storage = Arc::new(IpfsStorage::new(&config.shared_storage)?);
    let exchange = Arc::new(HttpDataExchange::new(&config.data_exchange)?);
    let client = BlockchainClient::new(config.blockchain.clone()).await?;
    let wallet = Wallet::from_env(config.blockchain.chain_id)?;
    let blockchain: Arc<dyn Blockchain> = Arc::new(EthereumBatchPin::new(client, wallet)?);

    // Collaborators
    let (root_ctx, cancel) = Context::cancellable();
    let operations = Arc::new(OperationManager::new(database.clone()));
    operations.register_handler(
        Arc::new(PinBatchHandler::new(blockchain.clone(), database.clone())),
        &[OpType::BlockchainPinBatch],
    );
    let scheduler = LocalBatchManager::new(database.clone(), config.retries.clone(), root_ctx);
    let bridge = Arc::new(LocalBridge::new(
        database.clone(),
        Duration::from_secs(config.api.sync_wait_timeout_secs),
    ));
    scheduler.add_listener(bridge.clone());
    let scheduler = Arc::new(scheduler);
    let data = Arc::new(LocalDataManager::new(
        database.clone(),
        exchange.clone(),
        scheduler.clone(),
    ));
    let identity = Arc::new(LocalIdentity::new(&config.node));
    let batchpin = Arc::new(LedgerPinSubmitter::new(blockchain.as_ref(), operations.clone()));

    let manager = BroadcastManager::builder()
        .database(database)
        .identity(identity)
        .data(data)
        .blockchain(blockchain)
        .data_exchange(exchange)
        .shared_storage(storage)
        .scheduler(scheduler.clone())
        .syncasync(bridge)
        .batchpin(batchpin)
        .metrics(metrics)
        .operations(operations)
        .options(DispatcherOptions::from(&config.broadcast))
        .build()?;

    // API
    let listener = TcpListener::bind(&config.api.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = ApiServer::new(manager, config.node.clone(), config.api.clone());
    let serve = tokio::spawn(server.run(listener, shutdown.signalled()));

    wait_for_signal().await;
    shutdown.trigger();
    cancel.cancel();

    match tokio::time::timeout(Duration::from_secs(30), serve).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP API failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP API task panicked"),
        Err(_) => tracing::warn!("HTTP API did not drain in time, exiting"),
    }
    tracing::info!(
        assemblers = scheduler.active_assemblers(),
        "Shutdown complete"
    );
    Ok(())
}
