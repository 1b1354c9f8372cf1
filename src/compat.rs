//! Signature-slot helpers over legacy transactions
//!
//! A legacy message lists its signer keys first: the first
//! `header.num_required_signatures` entries of `account_keys` are the signers,
//! and `Transaction::signatures[i]` is the slot for `account_keys[i]`. An
//! all-zero signature marks a slot that is present but not yet filled.
//!
//! These helpers give the co-signers and the submitter one consistent view of
//! that layout.

use solana_sdk::{
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

/// State of one signer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Slot exists but nobody has signed it yet
    Pending,
    /// Slot holds a signature that verifies against the message bytes
    Valid,
    /// Slot holds a signature that does not verify
    Invalid,
}

/// Signer keys of a message, in slot order
#[inline]
#[must_use]
pub fn get_required_signers(message: &Message) -> &[Pubkey] {
    let n = message.header.num_required_signatures as usize;
    &message.account_keys[..n.min(message.account_keys.len())]
}

/// Index of `signer` in the slot list
#[must_use]
pub fn slot_index(tx: &Transaction, signer: &Pubkey) -> Option<usize> {
    get_required_signers(&tx.message)
        .iter()
        .position(|k| k == signer)
}

#[inline]
#[must_use]
pub fn is_pending(sig: &Signature) -> bool {
    *sig == Signature::default()
}

/// Per-slot state, verified against the serialized message
#[must_use]
pub fn slot_states(tx: &Transaction) -> Vec<(Pubkey, SlotState)> {
    let message_bytes = tx.message_data();
    get_required_signers(&tx.message)
        .iter()
        .zip(tx.signatures.iter())
        .map(|(key, sig)| {
            let state = if is_pending(sig) {
                SlotState::Pending
            } else if sig.verify(key.as_ref(), &message_bytes) {
                SlotState::Valid
            } else {
                SlotState::Invalid
            };
            (*key, state)
        })
        .collect()
}

/// Signers whose slot is still empty
#[must_use]
pub fn pending_signers(tx: &Transaction) -> Vec<Pubkey> {
    get_required_signers(&tx.message)
        .iter()
        .zip(tx.signatures.iter())
        .filter(|(_, sig)| is_pending(sig))
        .map(|(k, _)| *k)
        .collect()
}

/// Every slot exists and holds a signature (validity not checked)
#[must_use]
pub fn all_slots_filled(tx: &Transaction) -> bool {
    has_slot_for_every_signer(tx) && tx.signatures.iter().all(|s| !is_pending(s))
}

/// The signature vector has exactly one slot per required signer
#[must_use]
pub fn has_slot_for_every_signer(tx: &Transaction) -> bool {
    tx.signatures.len() == tx.message.header.num_required_signatures as usize
        && tx.message.account_keys.len() >= tx.signatures.len()
}

/// The transaction's identifier: the fee payer's signature, once filled
#[must_use]
pub fn transaction_id(tx: &Transaction) -> Option<Signature> {
    tx.signatures.first().copied().filter(|s| !is_pending(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        signature::Keypair,
        signer::Signer,
    };

    fn two_signer_tx(payer: &Pubkey, cosigner: &Pubkey) -> Transaction {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![
                AccountMeta::new(*payer, true),
                AccountMeta::new_readonly(*cosigner, true),
            ],
        );
        Transaction::new_unsigned(Message::new_with_blockhash(
            &[ix],
            Some(payer),
            &Hash::new_unique(),
        ))
    }

    #[test]
    fn test_slots_follow_account_order() {
        let payer = Keypair::new();
        let cosigner = Keypair::new();
        let tx = two_signer_tx(&payer.pubkey(), &cosigner.pubkey());

        assert_eq!(
            get_required_signers(&tx.message),
            &[payer.pubkey(), cosigner.pubkey()]
        );
        assert_eq!(slot_index(&tx, &payer.pubkey()), Some(0));
        assert_eq!(slot_index(&tx, &cosigner.pubkey()), Some(1));
        assert_eq!(slot_index(&tx, &Pubkey::new_unique()), None);
        assert!(has_slot_for_every_signer(&tx));
    }

    #[test]
    fn test_slot_states_track_partial_signing() {
        let payer = Keypair::new();
        let cosigner = Keypair::new();
        let mut tx = two_signer_tx(&payer.pubkey(), &cosigner.pubkey());
        let blockhash = tx.message.recent_blockhash;

        assert_eq!(pending_signers(&tx).len(), 2);
        assert!(transaction_id(&tx).is_none());

        tx.partial_sign(&[&cosigner], blockhash);
        assert_eq!(
            slot_states(&tx),
            vec![
                (payer.pubkey(), SlotState::Pending),
                (cosigner.pubkey(), SlotState::Valid)
            ]
        );
        assert!(!all_slots_filled(&tx));

        tx.partial_sign(&[&payer], blockhash);
        assert!(all_slots_filled(&tx));
        assert_eq!(transaction_id(&tx), Some(tx.signatures[0]));
    }

    #[test]
    fn test_tampered_signature_is_invalid() {
        let payer = Keypair::new();
        let cosigner = Keypair::new();
        let mut tx = two_signer_tx(&payer.pubkey(), &cosigner.pubkey());
        tx.signatures[1] = Signature::from([9u8; 64]);
        assert_eq!(slot_states(&tx)[1].1, SlotState::Invalid);
    }
}
