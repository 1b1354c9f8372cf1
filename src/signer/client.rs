//! Client co-signer
//!
//! Drives the wallet through its suspension points (connect, then sign), each
//! with its own timeout, and checks that the wallet only filled the user's
//! slot. A wallet that alters the message or another slot invalidates the
//! facilitator's authorization, which is reported as a verification failure.

use crate::compat::{self, SlotState};
use crate::signer::errors::SigningError;
use crate::signer::wallet::WalletCapability;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ClientCoSigner {
    pub connect_timeout: Duration,
    pub sign_timeout: Duration,
}

impl Default for ClientCoSigner {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            sign_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientCoSigner {
    pub fn new(connect_timeout: Duration, sign_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            sign_timeout,
        }
    }

    /// Connected account, connecting first if needed
    pub async fn ensure_connected(&self, wallet: &dyn WalletCapability) -> Result<Pubkey, SigningError> {
        if wallet.is_connected() {
            if let Some(key) = wallet.pubkey() {
                return Ok(key);
            }
        }
        info!("Wallet not connected, requesting connection");
        let key = timeout(self.connect_timeout, wallet.connect())
            .await
            .map_err(|_| SigningError::Timeout {
                stage: "connect",
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| match SigningError::from(e) {
                SigningError::UserRejected => SigningError::UserRejected,
                other => SigningError::NotConnected(other.to_string()),
            })?;
        Ok(key)
    }

    /// Have the wallet fill the user's slot of a partially signed transaction
    pub async fn co_sign(
        &self,
        wallet: &dyn WalletCapability,
        tx: Transaction,
    ) -> Result<Transaction, SigningError> {
        let user = self.ensure_connected(wallet).await?;
        let index = compat::slot_index(&tx, &user).ok_or(SigningError::MissingSlot { signer: user })?;

        let states = compat::slot_states(&tx);
        if let Some((key, _)) = states.iter().find(|(_, s)| *s == SlotState::Invalid) {
            error!(signer = %key, signers = ?states, "Received transaction carries an invalid signature");
            return Err(SigningError::SignatureVerificationFailed(format!(
                "signature for {} does not verify before user signing",
                key
            )));
        }

        let message_before = tx.message_data();
        let slots_before = tx.signatures.clone();

        let signed = match timeout(self.sign_timeout, wallet.sign_transaction(tx)).await {
            Err(_) => {
                return Err(SigningError::Timeout {
                    stage: "sign",
                    timeout_ms: self.sign_timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                let err = SigningError::from(e);
                match &err {
                    SigningError::UserRejected => info!(wallet = %user, "User declined to sign"),
                    SigningError::SignatureVerificationFailed(m) => {
                        error!(wallet = %user, reason = %m, "Wallet reported signature mismatch")
                    }
                    other => warn!(wallet = %user, error = %other, "Wallet signing failed"),
                }
                return Err(err);
            }
            Ok(Ok(signed)) => signed,
        };

        verify_user_signature(&signed, index, &message_before, &slots_before)?;
        info!(wallet = %user, "User signature added");
        Ok(signed)
    }
}

fn verify_user_signature(
    signed: &Transaction,
    index: usize,
    message_before: &[u8],
    slots_before: &[solana_sdk::signature::Signature],
) -> Result<(), SigningError> {
    if signed.message_data() != message_before {
        return Err(SigningError::SignatureVerificationFailed(
            "wallet altered the message bytes".into(),
        ));
    }
    if signed.signatures.len() != slots_before.len() {
        return Err(SigningError::SignatureVerificationFailed(
            "wallet changed the number of signature slots".into(),
        ));
    }
    for (i, (old, new)) in slots_before.iter().zip(signed.signatures.iter()).enumerate() {
        if i != index && !compat::is_pending(old) && old != new {
            return Err(SigningError::SignatureVerificationFailed(format!(
                "wallet replaced the signature in slot {}",
                i
            )));
        }
    }
    match compat::slot_states(signed).get(index).map(|(_, s)| *s) {
        Some(SlotState::Valid) => Ok(()),
        Some(SlotState::Pending) => Err(SigningError::SigningFailed(
            "wallet returned without signing".into(),
        )),
        _ => Err(SigningError::SignatureVerificationFailed(
            "user signature does not verify".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::FacilitatorSigner;
    use crate::signer::KeypairWallet;
    use crate::test_utils::{MockWallet, WalletBehavior};
    use crate::tx_builder::plain_transfer;
    use solana_sdk::{
        hash::Hash,
        message::Message,
        signature::{Keypair, Signer},
    };

    fn partially_signed(user: &Pubkey, facilitator: &FacilitatorSigner) -> Transaction {
        let ix = plain_transfer(user, &Pubkey::new_unique(), 5_000, &facilitator.pubkey());
        let msg = Message::new_with_blockhash(&[ix], Some(user), &Hash::new_unique());
        facilitator.co_sign(Transaction::new_unsigned(msg)).unwrap()
    }

    #[tokio::test]
    async fn test_co_sign_connects_then_signs() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let user = Keypair::new();
        let tx = partially_signed(&user.pubkey(), &facilitator);
        let wallet = KeypairWallet::new(user);

        let signed = ClientCoSigner::default().co_sign(&wallet, tx).await.unwrap();
        assert!(wallet.is_connected());
        assert!(compat::all_slots_filled(&signed));
        assert!(signed.verify().is_ok());
    }

    #[tokio::test]
    async fn test_user_rejection_is_distinct() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let wallet = MockWallet::new(Keypair::new(), WalletBehavior::Reject);
        let tx = partially_signed(&wallet.address(), &facilitator);

        let err = ClientCoSigner::default().co_sign(&wallet, tx).await.unwrap_err();
        assert_eq!(err, SigningError::UserRejected);
    }

    #[tokio::test]
    async fn test_tampered_facilitator_slot_is_verification_failure() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let user = Keypair::new();
        let mut tx = partially_signed(&user.pubkey(), &facilitator);
        tx.message.recent_blockhash = Hash::new_unique();

        let err = ClientCoSigner::default()
            .co_sign(&KeypairWallet::new(user), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::SignatureVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_wallet_altering_message_is_detected() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let wallet = MockWallet::new(Keypair::new(), WalletBehavior::AlterMessage);
        let tx = partially_signed(&wallet.address(), &facilitator);

        let err = ClientCoSigner::default().co_sign(&wallet, tx).await.unwrap_err();
        assert!(matches!(err, SigningError::SignatureVerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_wallet_fault_carries_message() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let wallet = MockWallet::new(Keypair::new(), WalletBehavior::Fail("device disconnected".into()));
        let tx = partially_signed(&wallet.address(), &facilitator);

        let err = ClientCoSigner::default().co_sign(&wallet, tx).await.unwrap_err();
        assert_eq!(err, SigningError::SigningFailed("device disconnected".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_timeout() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let wallet = MockWallet::new(Keypair::new(), WalletBehavior::Hang);
        let tx = partially_signed(&wallet.address(), &facilitator);

        let signer = ClientCoSigner::new(Duration::from_secs(1), Duration::from_secs(5));
        let err = signer.co_sign(&wallet, tx).await.unwrap_err();
        assert!(matches!(err, SigningError::Timeout { stage: "sign", .. }));
    }

    #[tokio::test]
    async fn test_wrong_account_has_no_slot() {
        let facilitator = FacilitatorSigner::from_keypair(Keypair::new());
        let tx = partially_signed(&Pubkey::new_unique(), &facilitator);
        let err = ClientCoSigner::default()
            .co_sign(&KeypairWallet::new(Keypair::new()), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::MissingSlot { .. }));
    }
}
