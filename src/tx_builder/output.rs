//! Transaction build output
//!
//! Holds the unsigned purchase transaction together with what downstream
//! steps need to know about it: which path produced it, the liveness window
//! it was built against, and the signer slots it requires.

use crate::rpc::LivenessToken;
use crate::tx_builder::instructions::BuildPath;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};

/// Unsigned purchase transaction plus build metadata
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Transaction with one empty slot per required signer
    pub tx: Transaction,

    pub path: BuildPath,

    /// Liveness token baked into the message; once it expires the
    /// transaction can only be rebuilt, never resent
    pub liveness: LivenessToken,

    /// Signer keys in slot order; the fee payer comes first
    pub required_signers: Vec<Pubkey>,

    pub fallback_reason: Option<String>,
}

impl BuildOutput {
    /// Wrap a transaction, extracting its signer list from the message header
    pub fn new(
        tx: Transaction,
        path: BuildPath,
        liveness: LivenessToken,
        fallback_reason: Option<String>,
    ) -> Self {
        let required_signers = crate::compat::get_required_signers(&tx.message).to_vec();
        Self {
            tx,
            path,
            liveness,
            required_signers,
            fallback_reason,
        }
    }

    pub fn tx_ref(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_tx(self) -> Transaction {
        self.tx
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }

    pub fn is_fallback(&self) -> bool {
        self.path == BuildPath::FallbackTransfer
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.required_signers.first()
    }
}
