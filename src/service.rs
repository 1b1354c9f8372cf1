//! Server-side purchase orchestration
//!
//! `create` validates the intent, builds the transaction, has the facilitator
//! sign it and encodes it for the client. `complete` verifies the signature
//! landed and appends a ledger record. `status` reads the ledger.
//!
//! Input validation always happens before any network interaction.

use crate::codec::{self, CodecError};
use crate::ledger::{LedgerError, PurchaseLedger, PurchaseRecord, PurchaseView};
use crate::metrics::{metrics, Timer};
use crate::observability::PurchaseLogger;
use crate::quote::{IntentError, PurchaseIntent, PurchaseQuote};
use crate::rpc::{RpcBackend, RpcManagerError};
use crate::signer::{FacilitatorSigner, SigningError};
use crate::submit::Submitter;
use crate::tx_builder::{completion_instruction, BuildPath, PurchaseTxBuilder, TransactionBuilderError};
use anyhow::Context;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::{message::Message, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Input(#[from] IntentError),

    #[error("Transaction not found on-chain")]
    TransactionNotFound { signature: String },

    #[error("Transaction failed on-chain: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("Failed to build purchase transaction: {0}")]
    Build(#[source] TransactionBuilderError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<TransactionBuilderError> for ServiceError {
    fn from(e: TransactionBuilderError) -> Self {
        match e {
            TransactionBuilderError::Intent(inner) => ServiceError::Input(inner),
            other => ServiceError::Build(other),
        }
    }
}

impl ServiceError {
    /// Malformed input or a signature that cannot be recorded
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Input(_) | Self::TransactionNotFound { .. } | Self::TransactionFailed { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::TransactionNotFound { .. } => "not_found",
            Self::TransactionFailed { .. } => "failed_on_chain",
            Self::Build(e) => e.category(),
            Self::Signing(e) => e.category(),
            Self::Codec(_) => "codec",
            Self::Rpc(e) => e.category(),
            Self::Ledger(e) => e.category(),
        }
    }
}

/// Fields of a create request, as sent by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub wallet_address: Option<String>,
    pub sol_amount: Option<f64>,
    pub lock_duration_months: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePurchaseRequest {
    pub wallet_address: Option<String>,
    pub sol_amount: Option<f64>,
    pub lock_duration_months: Option<u8>,
    pub transaction_signature: Option<String>,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, IntentError> {
    value.ok_or(IntentError::MissingField(field))
}

impl CreatePurchaseRequest {
    pub fn intent(&self) -> Result<PurchaseIntent, IntentError> {
        let wallet = required(self.wallet_address.as_deref(), "walletAddress")?;
        let sol = required(self.sol_amount, "solAmount")?;
        let months = required(self.lock_duration_months, "lockDurationMonths")?;
        PurchaseIntent::parse(wallet, sol, months)
    }
}

impl CompletePurchaseRequest {
    pub fn intent_and_signature(&self) -> Result<(PurchaseIntent, Signature), IntentError> {
        let wallet = required(self.wallet_address.as_deref(), "walletAddress")?;
        let sol = required(self.sol_amount, "solAmount")?;
        let months = required(self.lock_duration_months, "lockDurationMonths")?;
        let raw_sig = required(self.transaction_signature.as_deref(), "transactionSignature")?;
        let intent = PurchaseIntent::parse(wallet, sol, months)?;
        let signature = Signature::from_str(raw_sig.trim())
            .map_err(|e| IntentError::invalid("transactionSignature", e.to_string()))?;
        Ok((intent, signature))
    }
}

/// Metadata returned alongside the encoded transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseMetadata {
    #[serde(flatten)]
    pub quote: PurchaseQuote,
    pub realm_id: String,
    pub build_path: BuildPath,
    pub last_valid_block_height: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPurchase {
    /// Base64 wire form, facilitator slot filled, user slot pending
    pub transaction: String,
    pub metadata: PurchaseMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPurchase {
    /// `None` when the record could not be written; the purchase itself landed
    pub record: Option<PurchaseRecord>,
    pub recorded: bool,
    /// The signature had already been recorded
    pub already_recorded: bool,
}

/// Tracks builds in progress per wallet
#[derive(Debug, Default)]
struct InFlight {
    builds: DashMap<Pubkey, usize>,
}

struct InFlightGuard<'a> {
    inflight: &'a InFlight,
    wallet: Pubkey,
}

impl InFlight {
    fn enter(&self, wallet: Pubkey) -> InFlightGuard<'_> {
        let concurrent = {
            let mut count = self.builds.entry(wallet).or_insert(0);
            *count += 1;
            *count
        };
        metrics().builds_in_flight.inc();
        if concurrent > 1 {
            metrics().concurrent_same_wallet_builds.inc();
            warn!(
                wallet = %wallet,
                concurrent,
                "Concurrent purchase builds for the same wallet; they may race on its governance accounts"
            );
        }
        InFlightGuard {
            inflight: self,
            wallet,
        }
    }

    fn count(&self, wallet: &Pubkey) -> usize {
        self.builds.get(wallet).map(|c| *c).unwrap_or(0)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.inflight.builds.get_mut(&self.wallet) {
            *count = count.saturating_sub(1);
        }
        self.inflight.builds.remove_if(&self.wallet, |_, c| *c == 0);
        metrics().builds_in_flight.dec();
    }
}

#[derive(Debug)]
pub struct PurchaseService {
    builder: PurchaseTxBuilder,
    facilitator: Result<FacilitatorSigner, SigningError>,
    rpc: Arc<dyn RpcBackend>,
    ledger: PurchaseLedger,
    completion_notices: Option<Submitter>,
    inflight: InFlight,
}

impl PurchaseService {
    /// `facilitator` may be the load error; requests then fail before any network call
    pub fn new(
        builder: PurchaseTxBuilder,
        facilitator: Result<FacilitatorSigner, SigningError>,
        rpc: Arc<dyn RpcBackend>,
        ledger: PurchaseLedger,
    ) -> Self {
        Self {
            builder,
            facilitator,
            rpc,
            ledger,
            completion_notices: None,
            inflight: InFlight::default(),
        }
    }

    /// Also send a best-effort `completePurchase` notice after recording
    pub fn with_completion_notices(mut self, submitter: Submitter) -> Self {
        self.completion_notices = Some(submitter);
        self
    }

    pub fn ledger(&self) -> &PurchaseLedger {
        &self.ledger
    }

    pub fn realm(&self) -> Pubkey {
        self.builder.program().realm
    }

    pub fn facilitator(&self) -> Result<&FacilitatorSigner, SigningError> {
        self.facilitator.as_ref().map_err(Clone::clone)
    }

    pub fn builds_in_flight(&self, wallet: &Pubkey) -> usize {
        self.inflight.count(wallet)
    }

    pub async fn create_purchase_transaction(
        &self,
        request: &CreatePurchaseRequest,
        log: &PurchaseLogger,
    ) -> Result<CreatedPurchase, ServiceError> {
        let result = self.create_inner(request, log).await;
        if let Err(e) = &result {
            metrics().build_failures.with_label_values(&[e.category()]).inc();
            log.log_request_rejected("create-purchase-transaction", e.category(), &e.to_string());
        }
        result
    }

    async fn create_inner(
        &self,
        request: &CreatePurchaseRequest,
        log: &PurchaseLogger,
    ) -> Result<CreatedPurchase, ServiceError> {
        let timer = Timer::new();
        let intent = request.intent()?;
        let facilitator = self.facilitator()?;
        log.log_build_requested(&intent.wallet.to_string(), intent.sol_amount, intent.duration.months());

        let _guard = self.inflight.enter(intent.wallet);
        let output = self.builder.build(&intent, &facilitator.pubkey()).await?;
        let path = output.path;
        let liveness = output.liveness;
        let fallback_reason = output.fallback_reason.clone();

        let partially_signed = facilitator.co_sign(output.into_tx())?;
        let transaction = codec::encode(&partially_signed)?;
        let quote = intent.quote_at(Utc::now());

        metrics().purchase_tx_created.inc();
        log.log_build_ready(
            &intent.wallet.to_string(),
            &path.to_string(),
            quote.token_amount,
            (timer.elapsed_secs() * 1000.0) as u64,
        );

        Ok(CreatedPurchase {
            transaction,
            metadata: PurchaseMetadata {
                quote,
                realm_id: self.realm().to_string(),
                build_path: path,
                last_valid_block_height: liveness.last_valid_block_height,
                fallback_reason,
            },
        })
    }

    pub async fn complete_purchase(
        &self,
        request: &CompletePurchaseRequest,
        log: &PurchaseLogger,
    ) -> Result<CompletedPurchase, ServiceError> {
        let result = self.complete_inner(request, log).await;
        if let Err(e) = &result {
            log.log_request_rejected("complete-purchase", e.category(), &e.to_string());
        }
        result
    }

    async fn complete_inner(
        &self,
        request: &CompletePurchaseRequest,
        log: &PurchaseLogger,
    ) -> Result<CompletedPurchase, ServiceError> {
        let (intent, signature) = request.intent_and_signature()?;

        if let Some(existing) = self.ledger.find_by_signature(&signature).await? {
            debug!(%signature, wallet = %existing.wallet_address, "Purchase already recorded");
            return Ok(CompletedPurchase {
                record: Some(existing),
                recorded: true,
                already_recorded: true,
            });
        }

        match self.rpc.get_transaction(&signature).await? {
            None => {
                return Err(ServiceError::TransactionNotFound {
                    signature: signature.to_string(),
                })
            }
            Some(landed) => {
                if let Some(reason) = landed.err {
                    return Err(ServiceError::TransactionFailed {
                        signature: signature.to_string(),
                        reason,
                    });
                }
                debug!(%signature, slot = landed.slot, "Transaction verified on-chain");
            }
        }

        let now = Utc::now();
        let quote = intent.quote_at(now);
        let completed = match self
            .ledger
            .record(&intent.wallet, quote.token_amount, intent.duration, &signature, now)
            .await
        {
            Ok(record) => {
                metrics().purchases_recorded.inc();
                log.log_purchase_recorded(&record.wallet_address, &record.transaction_signature, &record.id);
                CompletedPurchase {
                    record: Some(record),
                    recorded: true,
                    already_recorded: false,
                }
            }
            Err(LedgerError::Duplicate { .. }) => {
                // A concurrent completion won the append
                let record = self
                    .ledger
                    .find_by_signature(&signature)
                    .await?
                    .ok_or_else(|| LedgerError::Store("duplicate record vanished".into()))?;
                return Ok(CompletedPurchase {
                    record: Some(record),
                    recorded: true,
                    already_recorded: true,
                });
            }
            Err(e) => {
                metrics().ledger_write_failures.inc();
                log.log_ledger_write_failure(
                    &intent.wallet.to_string(),
                    &signature.to_string(),
                    quote.token_amount,
                    intent.duration.months(),
                    &e.to_string(),
                );
                CompletedPurchase {
                    record: None,
                    recorded: false,
                    already_recorded: false,
                }
            }
        };

        if self.completion_notices.is_some() {
            if let Err(e) = self.send_completion_notice(&intent, &signature).await {
                warn!(%signature, error = %format!("{:#}", e), "On-chain completion notice failed");
            }
        }
        Ok(completed)
    }

    /// Facilitator-signed `completePurchase` call; best effort
    async fn send_completion_notice(
        &self,
        intent: &PurchaseIntent,
        purchase_signature: &Signature,
    ) -> anyhow::Result<Signature> {
        let submitter = self
            .completion_notices
            .as_ref()
            .context("completion notices disabled")?;
        let facilitator = self.facilitator()?;
        let ix = completion_instruction(
            self.builder.interface(),
            self.builder.program(),
            intent,
            &purchase_signature.to_string(),
            &facilitator.pubkey(),
        )?;
        let liveness = self.rpc.get_latest_liveness_token().await?;
        let message = Message::new_with_blockhash(&[ix], Some(&facilitator.pubkey()), &liveness.blockhash);
        let tx = facilitator.co_sign(Transaction::new_unsigned(message))?;
        let sig = submitter.submit(&tx).await?;
        debug!(notice = %sig, purchase = %purchase_signature, "Completion notice sent");
        Ok(sig)
    }

    pub async fn purchase_status(&self, wallet_address: &str) -> Result<Vec<PurchaseView>, ServiceError> {
        let wallet = Pubkey::from_str(wallet_address.trim())
            .map_err(|e| IntentError::invalid("walletAddress", e.to_string()))?;
        let purchases = self.ledger.query(&wallet.to_string(), Utc::now()).await?;
        if purchases.is_empty() {
            debug!(wallet = %wallet, "No purchases found");
        }
        Ok(purchases)
    }
}
