//! Purchase quoting
//!
//! Deterministic pricing for a purchase intent: base tokens at a fixed
//! exchange rate, a bonus multiplier per lock duration, the unlock timestamp
//! and the lock-eligibility floor shared with the ledger and the fallback path.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tokens issued per whole native coin, before bonus.
pub const TOKEN_EXCHANGE_RATE: f64 = 100.0;

/// Purchases below this many tokens are transferred but never locked.
pub const MIN_LOCKED_TOKENS: f64 = 1.0;

/// Input validation errors for a purchase intent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

impl IntentError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Lock duration category accepted by the governance vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LockDuration {
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl LockDuration {
    pub const ALL: [LockDuration; 4] = [
        LockDuration::OneMonth,
        LockDuration::ThreeMonths,
        LockDuration::SixMonths,
        LockDuration::TwelveMonths,
    ];

    pub fn months(self) -> u8 {
        match self {
            Self::OneMonth => 1,
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
            Self::TwelveMonths => 12,
        }
    }

    /// Bonus applied on top of the base token amount
    pub fn bonus_multiplier(self) -> f64 {
        match self {
            Self::OneMonth => 1.02,
            Self::ThreeMonths => 1.06,
            Self::SixMonths => 1.12,
            Self::TwelveMonths => 1.25,
        }
    }

    /// Unlock timestamp for a purchase made at `from`.
    ///
    /// Calendar months; day-of-month is clamped to the end of shorter months
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn unlock_at(self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_add_months(Months::new(u32::from(self.months())))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl TryFrom<u8> for LockDuration {
    type Error = IntentError;

    fn try_from(months: u8) -> Result<Self, Self::Error> {
        match months {
            1 => Ok(Self::OneMonth),
            3 => Ok(Self::ThreeMonths),
            6 => Ok(Self::SixMonths),
            12 => Ok(Self::TwelveMonths),
            other => Err(IntentError::invalid(
                "lockDurationMonths",
                format!("{} is not one of 1, 3, 6, 12", other),
            )),
        }
    }
}

impl From<LockDuration> for u8 {
    fn from(d: LockDuration) -> u8 {
        d.months()
    }
}

impl fmt::Display for LockDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.months())
    }
}

/// A validated request to exchange native coin for tokens
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseIntent {
    pub wallet: Pubkey,
    pub sol_amount: f64,
    pub duration: LockDuration,
}

impl PurchaseIntent {
    pub fn new(wallet: Pubkey, sol_amount: f64, duration: LockDuration) -> Result<Self, IntentError> {
        if !sol_amount.is_finite() || sol_amount <= 0.0 {
            return Err(IntentError::invalid(
                "solAmount",
                format!("must be a positive number, got {}", sol_amount),
            ));
        }
        if sol_to_lamports(sol_amount) == 0 {
            return Err(IntentError::invalid(
                "solAmount",
                "amount is below one lamport",
            ));
        }
        Ok(Self {
            wallet,
            sol_amount,
            duration,
        })
    }

    /// Parse the loosely-typed fields a client sends
    pub fn parse(wallet: &str, sol_amount: f64, lock_duration_months: u8) -> Result<Self, IntentError> {
        if wallet.trim().is_empty() {
            return Err(IntentError::MissingField("walletAddress"));
        }
        let wallet = Pubkey::from_str(wallet.trim())
            .map_err(|e| IntentError::invalid("walletAddress", e.to_string()))?;
        let duration = LockDuration::try_from(lock_duration_months)?;
        Self::new(wallet, sol_amount, duration)
    }

    pub fn lamports(&self) -> u64 {
        sol_to_lamports(self.sol_amount)
    }

    pub fn quote_at(&self, now: DateTime<Utc>) -> PurchaseQuote {
        PurchaseQuote::compute(self.sol_amount, self.duration, now)
    }
}

/// Floor conversion from native units to lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).floor() as u64
}

/// Derived pricing for an intent; never persisted before confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseQuote {
    pub base_token_amount: f64,
    pub bonus_token_amount: f64,
    pub token_amount: f64,
    pub unlock_date: DateTime<Utc>,
    pub is_locked: bool,
}

impl PurchaseQuote {
    pub fn compute(sol_amount: f64, duration: LockDuration, now: DateTime<Utc>) -> Self {
        let base_token_amount = sol_amount * TOKEN_EXCHANGE_RATE;
        let token_amount = base_token_amount * duration.bonus_multiplier();
        Self {
            base_token_amount,
            bonus_token_amount: token_amount - base_token_amount,
            token_amount,
            unlock_date: duration.unlock_at(now),
            is_locked: is_lock_eligible(token_amount),
        }
    }
}

pub fn is_lock_eligible(token_amount: f64) -> bool {
    token_amount >= MIN_LOCKED_TOKENS
}
