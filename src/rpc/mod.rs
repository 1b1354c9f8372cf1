//! RPC Manager Module
//!
//! Network access for the purchase pipeline. Every call is asynchronous and
//! individually fallible; the rest of the crate only sees the [`RpcBackend`]
//! trait so tests can script the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentLevel, hash::Hash, pubkey::Pubkey, signature::Signature,
};

pub mod retry;
pub mod rpc_errors;
pub mod solana;

pub use retry::{retry_with_backoff, RetryPolicy};
pub use rpc_errors::RpcManagerError;
pub use solana::SolanaRpc;

/// Freshness marker a transaction must carry to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessToken {
    pub blockhash: Hash,
    /// Last block height at which a transaction using `blockhash` can land
    pub last_valid_block_height: u64,
}

/// Network-reported confidence level for a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Durability {
    Processed,
    Confirmed,
    Finalized,
}

impl Durability {
    pub fn is_at_least(self, other: Durability) -> bool {
        self >= other
    }
}

/// One entry of `getSignatureStatuses`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub durability: Durability,
    /// Execution error, if the transaction landed but failed
    pub err: Option<String>,
}

/// Summary of a transaction found by `getTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedTransaction {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub err: Option<String>,
}

/// Options passed with a raw transaction submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: CommitmentLevel,
    /// Node-side rebroadcast attempts
    pub max_retries: Option<usize>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            preflight_commitment: CommitmentLevel::Processed,
            max_retries: Some(5),
        }
    }
}

/// Network RPC client consumed by the builder, submitter and poller
#[async_trait]
pub trait RpcBackend: Send + Sync + std::fmt::Debug {
    /// Endpoint label used in logs and errors
    fn endpoint(&self) -> &str;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcManagerError>;

    async fn get_latest_liveness_token(&self) -> Result<LivenessToken, RpcManagerError>;

    /// Relay already-signed wire bytes; returns the node's reported signature
    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, RpcManagerError>;

    /// `Ok(None)` when the node has not seen the signature
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError>;

    /// `Ok(None)` when no transaction with this signature is visible at `confirmed`
    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<LandedTransaction>, RpcManagerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durability_ordering() {
        assert!(Durability::Finalized.is_at_least(Durability::Confirmed));
        assert!(Durability::Confirmed.is_at_least(Durability::Confirmed));
        assert!(!Durability::Processed.is_at_least(Durability::Confirmed));
    }
}
