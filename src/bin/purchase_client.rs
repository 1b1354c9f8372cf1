//! Purchase Client
//!
//! CLI that buys tokens through a facilitator service using a local keypair
//! as the wallet, and lists a wallet's recorded purchases.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use purchase_facilitator::{
    client::{max_spendable, PurchaseClient, PurchaseOutcome},
    confirmation::ConfirmationPoller,
    config::Config,
    observability::init_logging,
    rpc::{RpcBackend, SolanaRpc},
    signer::KeypairWallet,
    submit::Submitter,
};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Buy tokens through a purchase facilitator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Facilitator base URL
    #[arg(long, default_value = "http://localhost:8080", env = "FACILITATOR_URL")]
    server: String,

    /// Configuration file for RPC, submission and confirmation settings
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Buy tokens
    Buy {
        /// Wallet keypair file
        #[arg(short, long)]
        keypair: PathBuf,

        /// Amount of SOL to spend; defaults to the whole spendable balance
        #[arg(short, long)]
        amount: Option<f64>,

        /// Lock duration in months (1, 3, 6 or 12)
        #[arg(short, long, default_value = "1")]
        lock_months: u8,
    },

    /// List recorded purchases of a wallet
    Status {
        /// Wallet address
        wallet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config).context("Failed to load configuration")?;
    init_logging(args.verbose, config.json_logs(false))?;

    let rpc: Arc<dyn RpcBackend> = Arc::new(SolanaRpc::new(
        &config.rpc.url,
        config.rpc_timeout(),
        config.commitment()?,
    ));
    let client = PurchaseClient::new(
        args.server.clone(),
        rpc.clone(),
        Submitter::new(rpc.clone(), config.submit_config()),
        ConfirmationPoller::new(rpc.clone(), config.poll_interval(), config.status_timeout()),
        config.deadline(),
    );

    match args.command {
        Commands::Buy {
            keypair,
            amount,
            lock_months,
        } => {
            let wallet = KeypairWallet::from_file(&keypair)?;
            let amount = match amount {
                Some(amount) => amount,
                None => {
                    let balance = rpc.get_balance(&wallet.address()).await?;
                    match max_spendable(balance) {
                        Some(max) => max,
                        None => bail!("Balance of {} lamports leaves nothing to spend", balance),
                    }
                }
            };
            info!(wallet = %wallet.address(), amount, lock_months, "Starting purchase");

            match client.purchase(&wallet, amount, lock_months).await? {
                PurchaseOutcome::Confirmed { signature, record } => {
                    println!("Purchase confirmed: {}", signature);
                    match record {
                        Some(record) => println!(
                            "Recorded {} tokens, unlocks {}",
                            record.token_amount, record.unlock_date
                        ),
                        None => println!("The facilitator could not record it; keep the signature"),
                    }
                }
                PurchaseOutcome::SubmittedUnconfirmed { signature } => {
                    println!("Submitted but not yet confirmed: {}", signature);
                }
            }
        }
        Commands::Status { wallet } => {
            let wallet = Pubkey::from_str(&wallet).context("Invalid wallet address")?;
            let purchases = client.purchase_status(&wallet).await?;
            if purchases.is_empty() {
                println!("No purchases found for {}", wallet);
            }
            for p in purchases {
                println!(
                    "{}  {:>12.4} tokens  {:?}  unlocks {}  {}",
                    p.record.purchased_at.format("%Y-%m-%d"),
                    p.record.token_amount,
                    p.status,
                    p.record.unlock_date.format("%Y-%m-%d"),
                    p.record.transaction_signature
                );
            }
        }
    }
    Ok(())
}
