//! Signing error taxonomy
//!
//! Distinguishes the three outcomes callers must handle differently: the
//! user declined (expected, terminal), an existing signature no longer
//! verifies (terminal, points at a builder or codec defect), and every other
//! wallet fault.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SigningError {
    /// The facilitator key could not be loaded or used
    #[error("Facilitator key unavailable: {0}")]
    FacilitatorUnavailable(String),

    /// The user explicitly declined to sign
    #[error("User rejected the request")]
    UserRejected,

    /// A pre-existing signature, or the message it covers, no longer verifies
    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// The transaction has no slot for this signer
    #[error("Transaction has no signature slot for {signer}")]
    MissingSlot { signer: Pubkey },

    /// Wallet could not be connected
    #[error("Wallet not connected: {0}")]
    NotConnected(String),

    /// A suspension point exceeded its timeout
    #[error("Timed out waiting for wallet to {stage} after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    /// Any other wallet-layer fault
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl SigningError {
    /// No retry should be attempted with the same transaction
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UserRejected
                | Self::SignatureVerificationFailed(_)
                | Self::FacilitatorUnavailable(_)
                | Self::MissingSlot { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::FacilitatorUnavailable(_) => "facilitator_unavailable",
            Self::UserRejected => "user_rejected",
            Self::SignatureVerificationFailed(_) => "signature_mismatch",
            Self::MissingSlot { .. } => "missing_slot",
            Self::NotConnected(_) => "not_connected",
            Self::Timeout { .. } => "timeout",
            Self::SigningFailed(_) => "signing_failed",
        }
    }
}
