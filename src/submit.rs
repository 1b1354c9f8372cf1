//! Submitter
//!
//! Relays a fully signed transaction. The signature is fixed before the first
//! attempt, so every retry resends identical bytes and cannot double-spend.
//! Stale liveness tokens are not retried; the caller must rebuild.

use crate::codec::{self, CodecError};
use crate::compat;
use crate::metrics::metrics;
use crate::rpc::{retry_with_backoff, RetryPolicy, RpcBackend, RpcManagerError, SendOptions};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentLevel, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SubmitError {
    /// One or more signer slots are still empty
    #[error("Transaction is not fully signed; pending: {pending:?}")]
    Incomplete { pending: Vec<Pubkey> },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Submission failed after {attempts} attempt(s): {last_error}")]
    SubmissionFailed {
        attempts: u32,
        last_error: RpcManagerError,
    },

    /// The node acknowledged a different signature than the one we signed
    #[error("Node reported signature {reported}, expected {expected}")]
    SignatureMismatch {
        expected: Signature,
        reported: Signature,
    },
}

impl SubmitError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "incomplete",
            Self::Codec(_) => "codec",
            Self::SubmissionFailed { .. } => "submission",
            Self::SignatureMismatch { .. } => "mismatch",
        }
    }

    /// The liveness token expired; the only remedy is a fresh build
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self,
            Self::SubmissionFailed {
                last_error: RpcManagerError::BlockhashNotFound { .. }
                    | RpcManagerError::TransactionExpired { .. },
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitConfig {
    pub skip_preflight: bool,
    pub preflight_commitment: CommitmentLevel,
    /// Node-side rebroadcast count
    pub max_retries: Option<usize>,
    /// Client-side resend policy for transport faults
    pub retry: RetryPolicy,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        let send = SendOptions::default();
        Self {
            skip_preflight: send.skip_preflight,
            preflight_commitment: send.preflight_commitment,
            max_retries: send.max_retries,
            retry: RetryPolicy::default(),
        }
    }
}

impl SubmitConfig {
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            skip_preflight: self.skip_preflight,
            preflight_commitment: self.preflight_commitment,
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submitter {
    rpc: Arc<dyn RpcBackend>,
    config: SubmitConfig,
}

impl Submitter {
    pub fn new(rpc: Arc<dyn RpcBackend>, config: SubmitConfig) -> Self {
        Self { rpc, config }
    }

    /// Relay `tx` and return its signature
    pub async fn submit(&self, tx: &Transaction) -> Result<Signature, SubmitError> {
        if !compat::all_slots_filled(tx) {
            return Err(SubmitError::Incomplete {
                pending: compat::pending_signers(tx),
            });
        }
        let expected = compat::transaction_id(tx).ok_or_else(|| SubmitError::Incomplete {
            pending: compat::pending_signers(tx),
        })?;
        let wire = codec::to_wire_bytes(tx)?;
        let options = self.config.send_options();

        let reported = retry_with_backoff("send_transaction", &self.config.retry, || {
            self.rpc.send_raw_transaction(&wire, &options)
        })
        .await
        .map_err(|exhausted| {
            metrics().submission_failures.inc();
            error!(
                signature = %expected,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Submission failed"
            );
            SubmitError::SubmissionFailed {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            }
        })?;

        if reported != expected {
            return Err(SubmitError::SignatureMismatch { expected, reported });
        }
        metrics().submissions.inc();
        info!(signature = %expected, endpoint = %self.rpc.endpoint(), "Transaction submitted");
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{signed_transfer, MockRpc};

    fn submitter(rpc: Arc<MockRpc>, attempts: u32) -> Submitter {
        Submitter::new(
            rpc,
            SubmitConfig {
                retry: RetryPolicy::immediate(attempts),
                ..SubmitConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_transient_failures_resend_same_bytes() {
        let rpc = Arc::new(MockRpc::new());
        rpc.script_send(vec![
            Err(RpcManagerError::transport("mock", "reset")),
            Err(RpcManagerError::transport("mock", "reset")),
        ]);
        let tx = signed_transfer();

        let sig = submitter(rpc.clone(), 5).submit(&tx).await.unwrap();
        assert_eq!(sig, tx.signatures[0]);

        let sent = rpc.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|bytes| *bytes == sent[0]));
    }

    #[tokio::test]
    async fn test_bound_exhausted_surfaces_submission_failed() {
        let rpc = Arc::new(MockRpc::new());
        rpc.script_send((0..10).map(|_| Err(RpcManagerError::transport("mock", "down"))).collect());

        let err = submitter(rpc.clone(), 3).submit(&signed_transfer()).await.unwrap_err();
        assert!(matches!(err, SubmitError::SubmissionFailed { attempts: 3, .. }));
        assert_eq!(rpc.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_blockhash_needs_rebuild() {
        let rpc = Arc::new(MockRpc::new());
        rpc.script_send(vec![Err(RpcManagerError::BlockhashNotFound {
            endpoint: "mock".into(),
        })]);

        let err = submitter(rpc.clone(), 5).submit(&signed_transfer()).await.unwrap_err();
        assert!(err.needs_rebuild());
        assert_eq!(rpc.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_transaction_never_sent() {
        let rpc = Arc::new(MockRpc::new());
        let mut tx = signed_transfer();
        tx.signatures[1] = Signature::default();

        let err = submitter(rpc.clone(), 5).submit(&tx).await.unwrap_err();
        assert!(matches!(err, SubmitError::Incomplete { ref pending } if pending.len() == 1));
        assert!(rpc.sent().is_empty());
    }

    #[test]
    fn test_default_send_options() {
        let opts = SubmitConfig::default().send_options();
        assert!(opts.skip_preflight);
        assert_eq!(opts.preflight_commitment, CommitmentLevel::Processed);
        assert_eq!(opts.max_retries, Some(5));
    }
}
