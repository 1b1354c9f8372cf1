//! Facilitator co-signer
//!
//! The facilitator key is loaded once at startup and shared read-only. Signing
//! fills exactly the facilitator's slot and leaves every other slot, the
//! user's included, as it was.

use crate::compat::{self, SlotState};
use crate::signer::errors::SigningError;
use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Read a keypair file in either raw 64-byte or JSON array form
pub fn read_keypair_file(path: &Path) -> Result<Keypair> {
    let raw = Zeroizing::new(
        std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path.display()))?,
    );

    let bytes: Zeroizing<Vec<u8>> = if raw.len() == 64 {
        Zeroizing::new(raw.to_vec())
    } else {
        let json: Vec<u8> =
            serde_json::from_slice(&raw).context("Failed to parse keypair JSON")?;
        Zeroizing::new(json)
    };

    if bytes.len() != 64 {
        anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")
}

/// Server-side signer that co-authorizes purchase transactions
#[derive(Clone)]
pub struct FacilitatorSigner {
    keypair: Arc<Keypair>,
}

impl std::fmt::Debug for FacilitatorSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorSigner")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

impl FacilitatorSigner {
    /// Load the facilitator key; any failure is `FacilitatorUnavailable`
    pub fn load(path: &Path) -> Result<Self, SigningError> {
        let keypair = read_keypair_file(path)
            .map_err(|e| SigningError::FacilitatorUnavailable(format!("{:#}", e)))?;
        tracing::info!(facilitator = %keypair.pubkey(), "Facilitator key loaded");
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Fill the facilitator's slot of `tx`.
    ///
    /// The user's slot is not required to be filled and stays untouched.
    pub fn co_sign(&self, mut tx: Transaction) -> Result<Transaction, SigningError> {
        let me = self.pubkey();
        if !compat::has_slot_for_every_signer(&tx) {
            return Err(SigningError::SigningFailed(format!(
                "{} signature slots for {} required signers",
                tx.signatures.len(),
                tx.message.header.num_required_signatures
            )));
        }
        let index = compat::slot_index(&tx, &me).ok_or(SigningError::MissingSlot { signer: me })?;

        let before = tx.signatures.clone();
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| SigningError::SigningFailed(e.to_string()))?;

        // Only our slot may change
        for (i, (old, new)) in before.iter().zip(tx.signatures.iter()).enumerate() {
            if i != index && old != new {
                return Err(SigningError::SigningFailed(format!(
                    "slot {} changed while signing slot {}",
                    i, index
                )));
            }
        }

        let states = compat::slot_states(&tx);
        if states.get(index).map(|(_, s)| *s) != Some(SlotState::Valid) {
            return Err(SigningError::SignatureVerificationFailed(
                "facilitator signature does not verify against its own message".into(),
            ));
        }
        debug!(
            facilitator = %me,
            pending = ?compat::pending_signers(&tx),
            "Facilitator slot signed"
        );
        Ok(tx)
    }
}
