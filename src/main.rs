//! Purchase Facilitator
//!
//! Serves the purchase API: builds purchase transactions, co-signs them with
//! the facilitator key and records confirmed purchases.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use purchase_facilitator::{
    api::{create_router, AppState},
    config::Config,
    ledger::PurchaseLedger,
    observability::init_logging,
    rpc::{RpcBackend, SolanaRpc},
    service::PurchaseService,
    signer::FacilitatorSigner,
    submit::Submitter,
    tx_builder::{ProgramInterface, PurchaseTxBuilder},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "FACILITATOR_JSON_LOGS")]
    json_logs: bool,
}

fn build_service(config: &Config) -> Result<PurchaseService> {
    let program = config.purchase_program()?;
    let interface = match &config.program.idl_path {
        Some(path) => ProgramInterface::load(Path::new(path)),
        None => ProgramInterface::builtin(),
    };
    if !interface.is_usable() {
        warn!("Program interface unusable; purchases will use the fallback transfer");
    }

    let rpc: Arc<dyn RpcBackend> = Arc::new(SolanaRpc::new(
        &config.rpc.url,
        config.rpc_timeout(),
        config.commitment()?,
    ));

    let facilitator = FacilitatorSigner::load(Path::new(&config.facilitator.keypair_path));
    match &facilitator {
        Ok(signer) => info!("Facilitator address: {}", signer.pubkey()),
        Err(e) => error!(
            path = %config.facilitator.keypair_path,
            error = %e,
            "Facilitator key unavailable; purchase requests will fail until it is provided"
        ),
    }

    let builder = PurchaseTxBuilder::new(program, Arc::new(interface), rpc.clone());
    let mut service = PurchaseService::new(builder, facilitator, rpc.clone(), PurchaseLedger::default());
    if config.program.record_on_chain {
        service = service.with_completion_notices(Submitter::new(rpc, config.submit_config()));
    }
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // Logging format depends on the configuration, so load it first
    let config = Config::load(&args.config).context("Failed to load configuration")?;
    init_logging(args.verbose, config.json_logs(args.json_logs))?;

    info!("Starting purchase facilitator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if !args.config.exists() {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
    }
    info!(
        path = %args.config.display(),
        rpc = %config.rpc.url,
        realm = %config.program.realm,
        "Configuration loaded"
    );

    let service = Arc::new(build_service(&config)?);
    let router = create_router(AppState {
        service,
        metrics_enabled: config.monitoring.enable_metrics,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Purchase API listening on {}", config.server.bind);

    tokio::select! {
        res = axum::serve(listener, router) => {
            if let Err(e) = res {
                error!("API server error: {}", e);
            }
        }
        // Graceful shutdown signal
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Purchase facilitator stopped");
    Ok(())
}
