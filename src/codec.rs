//! Transport codec for partially signed transactions
//!
//! The wire form is the network's own serialization (bincode with compact
//! length prefixes), wrapped in standard padded base64. Pending slots travel
//! as all-zero signatures; nothing is re-ordered or re-encoded, so the bytes
//! the facilitator signed are exactly the bytes the wallet later signs.

use crate::compat;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use solana_sdk::{packet::PACKET_DATA_SIZE, transaction::Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Transaction decode error: {0}")]
    Decode(String),

    #[error("Transaction encode error: {0}")]
    Encode(String),

    /// Serialized size exceeds what a single packet can carry
    #[error("Transaction too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// Signature vector does not match the message's signer count
    #[error("Malformed signature slots: {slots} slots for {required} required signers")]
    SlotMismatch { slots: usize, required: usize },

    /// Decoding then re-encoding changed the bytes
    #[error("Transaction bytes are not canonical")]
    NonCanonical,
}

/// Wire bytes of a transaction, pending slots included
pub fn to_wire_bytes(tx: &Transaction) -> Result<Vec<u8>, CodecError> {
    let bytes = bincode::serialize(tx).map_err(|e| CodecError::Encode(e.to_string()))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    Ok(bytes)
}

/// Parse wire bytes, rejecting anything that would not re-encode identically
pub fn from_wire_bytes(bytes: &[u8]) -> Result<Transaction, CodecError> {
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: PACKET_DATA_SIZE,
        });
    }
    let tx: Transaction =
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;

    if !compat::has_slot_for_every_signer(&tx) {
        return Err(CodecError::SlotMismatch {
            slots: tx.signatures.len(),
            required: tx.message.header.num_required_signatures as usize,
        });
    }

    // Trailing garbage or non-minimal length prefixes would change the bytes
    let canonical = bincode::serialize(&tx).map_err(|e| CodecError::Encode(e.to_string()))?;
    if canonical != bytes {
        return Err(CodecError::NonCanonical);
    }
    Ok(tx)
}

/// Text-safe form for the network hop to the client
pub fn encode(tx: &Transaction) -> Result<String, CodecError> {
    Ok(BASE64_STANDARD.encode(to_wire_bytes(tx)?))
}

pub fn decode(encoded: &str) -> Result<Transaction, CodecError> {
    let bytes = BASE64_STANDARD.decode(encoded.trim())?;
    from_wire_bytes(&bytes)
}
