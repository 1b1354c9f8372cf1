//! JSON-RPC backend over the nonblocking Solana client

use super::{
    Durability, LandedTransaction, LivenessToken, RpcBackend, RpcManagerError, SendOptions,
    SignatureStatus,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{config::RpcSendTransactionConfig, request::RpcRequest};
use solana_sdk::{
    commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
};
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub struct SolanaRpc {
    client: RpcClient,
    url: String,
    timeout: Duration,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
            url: url.to_string(),
            timeout,
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.url, self.timeout.as_millis() as u64)
    }
}

fn durability_of(status: TransactionConfirmationStatus) -> Durability {
    match status {
        TransactionConfirmationStatus::Processed => Durability::Processed,
        TransactionConfirmationStatus::Confirmed => Durability::Confirmed,
        TransactionConfirmationStatus::Finalized => Durability::Finalized,
    }
}

/// Extract the fields we need from a `getTransaction` result
pub(crate) fn parse_landed_transaction(value: &Value) -> Result<LandedTransaction, RpcManagerError> {
    let slot = value
        .get("slot")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcManagerError::Malformed("getTransaction result has no slot".into()))?;
    let block_time = value.get("blockTime").and_then(Value::as_i64);
    let err = value
        .get("meta")
        .and_then(|m| m.get("err"))
        .filter(|e| !e.is_null())
        .map(|e| e.to_string());
    Ok(LandedTransaction {
        slot,
        block_time,
        err,
    })
}

#[async_trait]
impl RpcBackend for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcManagerError> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_latest_liveness_token(&self) -> Result<LivenessToken, RpcManagerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.client.commitment())
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(LivenessToken {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, RpcManagerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: options.max_retries,
            min_context_slot: None,
        };
        let encoded = BASE64_STANDARD.encode(wire);
        let sig: String = self
            .client
            .send(RpcRequest::SendTransaction, json!([encoded, config]))
            .await
            .map_err(|e| self.map_err(e))?;
        debug!(endpoint = %self.url, signature = %sig, "Transaction relayed");
        Signature::from_str(&sig)
            .map_err(|e| RpcManagerError::Malformed(format!("signature '{}': {}", sig, e)))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| SignatureStatus {
                slot: status.slot,
                durability: durability_of(status.confirmation_status()),
                err: status.err.as_ref().map(|e| e.to_string()),
            }))
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<LandedTransaction>, RpcManagerError> {
        let params = json!([
            signature.to_string(),
            {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let value: Option<Value> = self
            .client
            .send(RpcRequest::GetTransaction, params)
            .await
            .map_err(|e| self.map_err(e))?;
        value.as_ref().map(parse_landed_transaction).transpose()
    }
}
