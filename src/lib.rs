//! Purchase Facilitator Library
//!
//! Co-signed token purchases: the facilitator builds and partially signs a
//! purchase transaction, the user's wallet completes it, and confirmed
//! purchases are recorded in a ledger keyed by wallet.

pub mod api;
pub mod client;
pub mod codec;
pub mod compat;
pub mod config;
pub mod confirmation;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod pda;
pub mod quote;
pub mod rpc;
pub mod service;
pub mod signer;
pub mod submit;
pub mod test_utils;
pub mod tx_builder;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
