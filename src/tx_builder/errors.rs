//! Error types for the purchase transaction builder
//!
//! Two classes of failure live here:
//! - soft failures of the program-call path (unknown method, account-shape
//!   mismatch, unsupported argument type). The builder answers these by
//!   falling back to a plain transfer.
//! - hard failures (invalid input, derivation exhaustion, no liveness token)
//!   that reject the request.

use crate::pda::DerivationError;
use crate::quote::IntentError;
use crate::rpc::RpcManagerError;
use thiserror::Error;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Purchase intent failed validation
    #[error(transparent)]
    Intent(#[from] IntentError),

    /// A governance or token address could not be derived
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// The program interface does not declare the requested method
    #[error("Unknown program method: {0}")]
    UnknownMethod(String),

    /// A declared account could not be supplied, or flags disagree
    #[error("Account shape mismatch for {method}: {reason}")]
    AccountShapeMismatch {
        /// The method being assembled
        method: String,
        /// What did not line up
        reason: String,
    },

    /// The declared argument list cannot be encoded from the intent
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild {
        /// The program ID that failed to build an instruction
        program: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// The program interface document itself is unusable
    #[error("Program interface error: {0}")]
    Interface(String),

    /// Fetching a recent blockhash failed or returned nothing usable
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Signer set of the assembled transaction is not the expected one
    #[error("Invalid signer set: {0}")]
    InvalidSignerSet(String),

    /// RPC client error while reading network state
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Failures of the program-call path that trigger the transfer fallback
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::UnknownMethod(_)
                | Self::AccountShapeMismatch { .. }
                | Self::InstructionBuild { .. }
                | Self::Interface(_)
        )
    }

    /// Whether rebuilding from scratch might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Blockhash(_) => true,
            Self::Rpc(e) => e.is_retryable(),
            Self::Intent(_)
            | Self::Derivation(_)
            | Self::UnknownMethod(_)
            | Self::AccountShapeMismatch { .. }
            | Self::InstructionBuild { .. }
            | Self::Interface(_)
            | Self::InvalidSignerSet(_)
            | Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Intent(_) => "input",
            Self::Derivation(_) => "derivation",
            Self::UnknownMethod(_) => "interface",
            Self::AccountShapeMismatch { .. } => "accounts",
            Self::InstructionBuild { .. } => "instruction",
            Self::Interface(_) => "interface",
            Self::Blockhash(_) => "blockhash",
            Self::InvalidSignerSet(_) => "validation",
            Self::Rpc(_) => "rpc",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn shape(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccountShapeMismatch {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn blockhash_unavailable(reason: impl Into<String>) -> Self {
        Self::Blockhash(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::shape("createPurchaseTransaction", "missing realm");
        assert_eq!(
            err.to_string(),
            "Account shape mismatch for createPurchaseTransaction: missing realm"
        );

        let err = TransactionBuilderError::instruction_failed("token_purchase", "bad arg");
        assert_eq!(
            err.to_string(),
            "Instruction build error (program=token_purchase): bad arg"
        );
    }

    #[test]
    fn test_soft_failures_trigger_fallback() {
        assert!(TransactionBuilderError::UnknownMethod("x".into()).is_soft());
        assert!(TransactionBuilderError::shape("m", "r").is_soft());
        assert!(TransactionBuilderError::instruction_failed("p", "r").is_soft());
        assert!(TransactionBuilderError::Interface("bad idl".into()).is_soft());

        assert!(!TransactionBuilderError::blockhash_unavailable("x").is_soft());
        assert!(!TransactionBuilderError::internal("x").is_soft());
        assert!(!TransactionBuilderError::Derivation(
            DerivationError::AddressDerivationExhausted {
                label: "x".into(),
                program: solana_sdk::pubkey::Pubkey::new_unique(),
            }
        )
        .is_soft());
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::blockhash_unavailable("stale").is_retryable());
        assert!(!TransactionBuilderError::UnknownMethod("x".into()).is_retryable());
        assert!(!TransactionBuilderError::internal("x").is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransactionBuilderError::blockhash_unavailable("x").category(), "blockhash");
        assert_eq!(TransactionBuilderError::shape("m", "r").category(), "accounts");
        assert_eq!(TransactionBuilderError::internal("x").category(), "internal");
    }
}
