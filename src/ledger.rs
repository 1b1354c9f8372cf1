//! Purchase ledger
//!
//! Append-only record of completed purchases keyed by wallet. Records are
//! immutable once written; lock status is derived from `now` at query time
//! and never stored.
//!
//! A transaction signature is recorded at most once across all wallets.
//!
//! The ledger depends only on [`PurchaseStore`], so a durable store can
//! replace [`InMemoryStore`].

use crate::quote::{is_lock_eligible, LockDuration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A record for this signature already exists
    #[error("Purchase already recorded for signature {signature}")]
    Duplicate { signature: String },

    #[error("Store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Duplicate { .. } => "duplicate",
            Self::Store(_) => "store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: String,
    #[serde(rename = "userPublicKey", alias = "walletAddress")]
    pub wallet_address: String,
    #[serde(rename = "amount", alias = "tokenAmount")]
    pub token_amount: f64,
    pub lock_duration_months: u8,
    pub purchased_at: DateTime<Utc>,
    pub unlock_date: DateTime<Utc>,
    pub transaction_signature: String,
    /// Whether the amount qualified for the governance lock
    pub is_locked: bool,
}

impl PurchaseRecord {
    pub fn status_at(&self, now: DateTime<Utc>) -> LockStatus {
        if !self.is_locked {
            LockStatus::NotLocked
        } else if now >= self.unlock_date {
            LockStatus::Unlocked
        } else {
            LockStatus::Locked
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockStatus {
    Locked,
    Unlocked,
    NotLocked,
}

/// A record as returned to callers, with status computed for one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    #[serde(flatten)]
    pub record: PurchaseRecord,
    pub status: LockStatus,
}

#[async_trait]
pub trait PurchaseStore: Send + Sync + std::fmt::Debug {
    /// Append a record; fails with `Duplicate` if its signature is stored
    /// under any wallet
    async fn append(&self, record: PurchaseRecord) -> Result<(), LedgerError>;

    /// Records for `wallet` in insertion order
    async fn query_by_wallet(&self, wallet: &str) -> Result<Vec<PurchaseRecord>, LedgerError>;

    async fn find_by_signature(&self, signature: &str) -> Result<Option<PurchaseRecord>, LedgerError>;
}

/// Volatile store; contents last for the process lifetime
#[derive(Debug, Default)]
pub struct InMemoryStore {
    by_wallet: DashMap<String, Vec<PurchaseRecord>>,
    /// signature -> (wallet, position in that wallet's list)
    by_signature: DashMap<String, (String, usize)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PurchaseStore for InMemoryStore {
    async fn append(&self, record: PurchaseRecord) -> Result<(), LedgerError> {
        // Lock order: signature entry, then wallet entry
        match self.by_signature.entry(record.transaction_signature.clone()) {
            Entry::Occupied(_) => Err(LedgerError::Duplicate {
                signature: record.transaction_signature,
            }),
            Entry::Vacant(slot) => {
                let wallet = record.wallet_address.clone();
                let mut records = self.by_wallet.entry(wallet.clone()).or_default();
                records.push(record);
                slot.insert((wallet, records.len() - 1));
                Ok(())
            }
        }
    }

    async fn query_by_wallet(&self, wallet: &str) -> Result<Vec<PurchaseRecord>, LedgerError> {
        Ok(self
            .by_wallet
            .get(wallet)
            .map(|records| records.value().clone())
            .unwrap_or_default())
    }

    async fn find_by_signature(&self, signature: &str) -> Result<Option<PurchaseRecord>, LedgerError> {
        let Some((wallet, index)) = self.by_signature.get(signature).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self
            .by_wallet
            .get(&wallet)
            .and_then(|records| records.value().get(index).cloned()))
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseLedger {
    store: Arc<dyn PurchaseStore>,
}

impl Default for PurchaseLedger {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }
}

impl PurchaseLedger {
    pub fn new(store: Arc<dyn PurchaseStore>) -> Self {
        Self { store }
    }

    /// Create and append a record for a submitted purchase
    pub async fn record(
        &self,
        wallet: &Pubkey,
        token_amount: f64,
        duration: LockDuration,
        signature: &Signature,
        purchased_at: DateTime<Utc>,
    ) -> Result<PurchaseRecord, LedgerError> {
        let record = PurchaseRecord {
            id: format!("purchase_{}", Uuid::new_v4().simple()),
            wallet_address: wallet.to_string(),
            token_amount,
            lock_duration_months: duration.months(),
            purchased_at,
            unlock_date: duration.unlock_at(purchased_at),
            transaction_signature: signature.to_string(),
            is_locked: is_lock_eligible(token_amount),
        };
        self.store.append(record.clone()).await?;
        Ok(record)
    }

    /// The record for `signature`, whichever wallet it was recorded under
    pub async fn find_by_signature(&self, signature: &Signature) -> Result<Option<PurchaseRecord>, LedgerError> {
        self.store.find_by_signature(&signature.to_string()).await
    }

    /// All purchases of `wallet` with lock status as of `now`
    pub async fn query(&self, wallet: &str, now: DateTime<Utc>) -> Result<Vec<PurchaseView>, LedgerError> {
        Ok(self
            .store
            .query_by_wallet(wallet)
            .await?
            .into_iter()
            .map(|record| PurchaseView {
                status: record.status_at(now),
                record,
            })
            .collect())
    }
}
