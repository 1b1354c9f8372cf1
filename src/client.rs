//! Client purchase flow
//!
//! Requests a partially signed transaction from the facilitator service, has
//! the wallet co-sign it, relays it and waits for confirmation. Only a
//! confirmed purchase is reported back to the service, and a failed report
//! does not undo the purchase.

use crate::codec::{self, CodecError};
use crate::confirmation::{ConfirmationPoller, ConfirmationState};
use crate::ledger::{PurchaseRecord, PurchaseView};
use crate::rpc::{RpcBackend, RpcManagerError};
use crate::service::{CompletePurchaseRequest, CreatePurchaseRequest, PurchaseMetadata};
use crate::signer::{ClientCoSigner, SigningError, WalletCapability};
use crate::submit::{SubmitError, Submitter};
use serde::Deserialize;
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Native coin kept back for fees when sizing a purchase
pub const FEE_RESERVE_SOL: f64 = 0.01;

/// Largest purchase the balance allows, or `None` if nothing is spendable
pub fn max_spendable(balance_lamports: u64) -> Option<f64> {
    let max = balance_lamports as f64 / LAMPORTS_PER_SOL as f64 - FEE_RESERVE_SOL;
    (max > 0.0).then_some(max)
}

#[derive(Error, Debug)]
pub enum ClientFlowError {
    #[error("Requested {requested} SOL but at most {available:.4} SOL is spendable")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("Server rejected request ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Rpc(#[from] RpcManagerError),

    #[error("Transaction {signature} failed on-chain: {reason}")]
    FailedOnChain { signature: Signature, reason: String },
}

impl ClientFlowError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Signing(SigningError::UserRejected))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// Confirmed; `record` is `None` if the service could not be notified
    Confirmed {
        signature: Signature,
        record: Option<PurchaseRecord>,
    },
    /// Relayed but not confirmed before the deadline; it may still land
    SubmittedUnconfirmed { signature: Signature },
}

impl PurchaseOutcome {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Confirmed { signature, .. } | Self::SubmittedUnconfirmed { signature } => signature,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    metadata: Option<PurchaseMetadata>,
    #[serde(default)]
    purchase_record: Option<PurchaseRecord>,
    #[serde(default)]
    purchases: Option<Vec<PurchaseView>>,
}

#[derive(Debug, Clone)]
pub struct PurchaseClient {
    http: reqwest::Client,
    base_url: String,
    rpc: Arc<dyn RpcBackend>,
    co_signer: ClientCoSigner,
    submitter: Submitter,
    poller: ConfirmationPoller,
    deadline: Duration,
}

impl PurchaseClient {
    pub fn new(
        base_url: impl Into<String>,
        rpc: Arc<dyn RpcBackend>,
        submitter: Submitter,
        poller: ConfirmationPoller,
        deadline: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rpc,
            co_signer: ClientCoSigner::default(),
            submitter,
            poller,
            deadline,
        }
    }

    pub fn with_co_signer(mut self, co_signer: ClientCoSigner) -> Self {
        self.co_signer = co_signer;
        self
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Envelope, ClientFlowError> {
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope = response.json().await?;
        if !status.is_success() || !envelope.success {
            let message = envelope
                .error
                .or(envelope.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientFlowError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(envelope)
    }

    /// Run one purchase end to end
    pub async fn purchase(
        &self,
        wallet: &dyn WalletCapability,
        sol_amount: f64,
        lock_duration_months: u8,
    ) -> Result<PurchaseOutcome, ClientFlowError> {
        let user = self.co_signer.ensure_connected(wallet).await?;
        self.check_balance(&user, sol_amount).await?;

        let created = self
            .call(self.http.post(format!("{}/api/create-purchase-transaction", self.base_url)).json(
                &CreatePurchaseRequest {
                    wallet_address: Some(user.to_string()),
                    sol_amount: Some(sol_amount),
                    lock_duration_months: Some(lock_duration_months),
                },
            ))
            .await?;
        let encoded = created.transaction.ok_or_else(|| ClientFlowError::Server {
            status: 200,
            message: "response carried no transaction".into(),
        })?;
        if let Some(meta) = &created.metadata {
            info!(
                token_amount = meta.quote.token_amount,
                locked = meta.quote.is_locked,
                path = %meta.build_path,
                "Purchase transaction received"
            );
        }

        let tx = codec::decode(&encoded)?;
        let signed = self.co_signer.co_sign(wallet, tx).await?;
        let signature = self.submitter.submit(&signed).await?;
        info!(%signature, "Purchase submitted, waiting for confirmation");

        let outcome = self.poller.wait(&signature, self.deadline).await;
        match outcome.state {
            ConfirmationState::Confirmed => {
                let record = match self
                    .notify_completion(&user, sol_amount, lock_duration_months, &signature)
                    .await
                {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(%signature, error = %e, "Purchase confirmed but completion notice failed");
                        None
                    }
                };
                Ok(PurchaseOutcome::Confirmed { signature, record })
            }
            ConfirmationState::Failed(reason) => Err(ClientFlowError::FailedOnChain { signature, reason }),
            ConfirmationState::Pending | ConfirmationState::Expired => {
                warn!(%signature, "Purchase not confirmed in time; check the signature later");
                Ok(PurchaseOutcome::SubmittedUnconfirmed { signature })
            }
        }
    }

    async fn check_balance(&self, user: &Pubkey, sol_amount: f64) -> Result<(), ClientFlowError> {
        let balance = self.rpc.get_balance(user).await?;
        let available = max_spendable(balance).unwrap_or(0.0);
        if sol_amount > available {
            return Err(ClientFlowError::InsufficientBalance {
                requested: sol_amount,
                available,
            });
        }
        Ok(())
    }

    async fn notify_completion(
        &self,
        user: &Pubkey,
        sol_amount: f64,
        lock_duration_months: u8,
        signature: &Signature,
    ) -> Result<Option<PurchaseRecord>, ClientFlowError> {
        let envelope = self
            .call(self.http.post(format!("{}/api/complete-purchase", self.base_url)).json(
                &CompletePurchaseRequest {
                    wallet_address: Some(user.to_string()),
                    sol_amount: Some(sol_amount),
                    lock_duration_months: Some(lock_duration_months),
                    transaction_signature: Some(signature.to_string()),
                },
            ))
            .await?;
        Ok(envelope.purchase_record)
    }

    pub async fn purchase_status(&self, wallet: &Pubkey) -> Result<Vec<PurchaseView>, ClientFlowError> {
        let envelope = self
            .call(self.http.get(format!("{}/api/purchase-status/{}", self.base_url, wallet)))
            .await?;
        Ok(envelope.purchases.unwrap_or_default())
    }
}
