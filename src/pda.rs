//! Address derivation for governance and token accounts
//!
//! All addresses are program-derived: they are computed from fixed seeds and
//! a governing program id, and are guaranteed to be off the ed25519 curve.
//! Derivation is pure; identical inputs give identical outputs on every
//! caller, which is what lets the on-chain program match them.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub const SEED_REALM_CONFIG: &[u8] = b"realm-config";
pub const SEED_GOVERNING_TOKEN_HOLDING: &[u8] = b"governance";
pub const SEED_GOVERNANCE_TOKEN_ACCOUNT: &[u8] = b"governance-token-account";
pub const SEED_TOKEN_OWNER_RECORD: &[u8] = b"token-owner-record";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// No bump in 255..=0 produced an off-curve address
    #[error("Address derivation exhausted for '{label}' under program {program}")]
    AddressDerivationExhausted { label: String, program: Pubkey },
}

/// A derived address and the bump that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: Pubkey,
    pub bump: u8,
}

/// Derive a program address, surfacing exhaustion instead of panicking
pub fn derive(label: &str, seeds: &[&[u8]], program_id: &Pubkey) -> Result<DerivedAddress, DerivationError> {
    Pubkey::try_find_program_address(seeds, program_id)
        .map(|(address, bump)| DerivedAddress { address, bump })
        .ok_or_else(|| DerivationError::AddressDerivationExhausted {
            label: label.to_string(),
            program: *program_id,
        })
}

/// The four governance accounts touched by a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernanceAddresses {
    pub realm_config: DerivedAddress,
    pub governing_token_holding: DerivedAddress,
    pub governance_token_account: DerivedAddress,
    pub token_owner_record: DerivedAddress,
}

impl GovernanceAddresses {
    pub fn derive(
        governance_program: &Pubkey,
        realm: &Pubkey,
        community_mint: &Pubkey,
        wallet: &Pubkey,
    ) -> Result<Self, DerivationError> {
        let realm_config = derive(
            "realm_config",
            &[SEED_REALM_CONFIG, realm.as_ref()],
            governance_program,
        )?;
        let governing_token_holding = derive(
            "governing_token_holding",
            &[
                SEED_GOVERNING_TOKEN_HOLDING,
                realm.as_ref(),
                community_mint.as_ref(),
            ],
            governance_program,
        )?;
        let governance_token_account = derive(
            "governance_token_account",
            &[
                SEED_GOVERNANCE_TOKEN_ACCOUNT,
                realm.as_ref(),
                community_mint.as_ref(),
                wallet.as_ref(),
            ],
            governance_program,
        )?;
        let token_owner_record = derive(
            "token_owner_record",
            &[
                SEED_TOKEN_OWNER_RECORD,
                realm.as_ref(),
                community_mint.as_ref(),
                wallet.as_ref(),
            ],
            governance_program,
        )?;

        Ok(Self {
            realm_config,
            governing_token_holding,
            governance_token_account,
            token_owner_record,
        })
    }
}

/// Associated token account of `wallet` for `mint` under the classic token program
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, DerivationError> {
    derive(
        "associated_token_account",
        &[wallet.as_ref(), spl_token::id().as_ref(), mint.as_ref()],
        &spl_associated_token_account::id(),
    )
    .map(|d| d.address)
}
