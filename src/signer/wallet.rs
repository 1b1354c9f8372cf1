//! Wallet capability consumed by the client co-signer
//!
//! The wallet is opaque and asynchronous: the core only asks whether it is
//! connected, asks it to connect, and hands it a transaction to sign.

use crate::compat::{self, SlotState};
use crate::signer::errors::SigningError;
use crate::signer::facilitator::read_keypair_file;
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Fault reported by a wallet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("User rejected: {0}")]
    Rejected(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl WalletError {
    /// Classify a free-form wallet message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("user rejected") || lower.contains("rejected the request") {
            Self::Rejected(message)
        } else if lower.contains("signature verification failed") {
            Self::SignatureVerification(message)
        } else if lower.contains("not connected") {
            Self::NotConnected
        } else {
            Self::Other(message)
        }
    }
}

impl From<WalletError> for SigningError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Rejected(_) => SigningError::UserRejected,
            WalletError::SignatureVerification(m) => SigningError::SignatureVerificationFailed(m),
            WalletError::NotConnected => SigningError::NotConnected("wallet reported not connected".into()),
            WalletError::Other(m) => SigningError::SigningFailed(m),
        }
    }
}

#[async_trait]
pub trait WalletCapability: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Address of the connected account
    fn pubkey(&self) -> Option<Pubkey>;

    async fn connect(&self) -> Result<Pubkey, WalletError>;

    /// Add this wallet's signature to `tx`, returning the signed transaction
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;
}

/// Wallet backed by a local keypair file
pub struct KeypairWallet {
    keypair: Keypair,
    connected: AtomicBool,
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("pubkey", &self.keypair.pubkey())
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(read_keypair_file(path)?))
    }

    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletCapability for KeypairWallet {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn pubkey(&self) -> Option<Pubkey> {
        self.is_connected().then(|| self.keypair.pubkey())
    }

    async fn connect(&self) -> Result<Pubkey, WalletError> {
        self.connected.store(true, Ordering::Release);
        Ok(self.keypair.pubkey())
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        if !self.is_connected() {
            return Err(WalletError::NotConnected);
        }
        // Refuse to add a signature next to one that no longer verifies
        if let Some((key, _)) = compat::slot_states(&tx)
            .into_iter()
            .find(|(_, state)| *state == SlotState::Invalid)
        {
            return Err(WalletError::SignatureVerification(format!(
                "existing signature for {} is invalid",
                key
            )));
        }
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Other(e.to_string()))?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classification() {
        assert!(matches!(
            WalletError::from_message("User rejected the request."),
            WalletError::Rejected(_)
        ));
        assert!(matches!(
            WalletError::from_message("Signature verification failed"),
            WalletError::SignatureVerification(_)
        ));
        assert_eq!(
            SigningError::from(WalletError::from_message("ledger locked")),
            SigningError::SigningFailed("ledger locked".into())
        );
        assert_eq!(
            SigningError::from(WalletError::Rejected("no".into())),
            SigningError::UserRejected
        );
    }

    #[tokio::test]
    async fn test_keypair_wallet_connects() {
        let wallet = KeypairWallet::new(Keypair::new());
        assert!(!wallet.is_connected());
        assert!(wallet.pubkey().is_none());
        let key = wallet.connect().await.unwrap();
        assert_eq!(wallet.pubkey(), Some(key));
    }
}
