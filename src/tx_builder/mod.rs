//! Purchase Transaction Builder
//!
//! Assembles the unsigned purchase transaction that the facilitator co-signs
//! and the user completes.
//!
//! ## Architecture
//!
//! - **errors**: error taxonomy, split into soft (fallback) and hard failures
//! - **idl**: declared program interface, argument encoding, discriminators
//! - **instructions**: account resolution and instruction planning
//! - **output**: build output with path and liveness metadata
//! - **builder**: the orchestrating [`PurchaseTxBuilder`]
//!
//! ## Paths
//!
//! ### Program call
//! One `createPurchaseTransaction` instruction naming every governance and
//! token account with the flags the interface declares.
//!
//! ### Fallback transfer
//! When the program call cannot be assembled (unknown method, account-shape
//! mismatch, unsupported argument type, unusable interface), a single plain
//! transfer from user to treasury for the same amount. The output records
//! [`BuildPath::FallbackTransfer`] so callers can tell the difference.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use purchase_facilitator::quote::{LockDuration, PurchaseIntent};
//! use purchase_facilitator::tx_builder::{PurchaseTxBuilder, TransactionBuilderError};
//! # use solana_sdk::pubkey::Pubkey;
//!
//! # async fn example(builder: PurchaseTxBuilder, user: Pubkey, facilitator: Pubkey)
//! #     -> Result<(), TransactionBuilderError> {
//! let intent = PurchaseIntent::new(user, 2.0, LockDuration::ThreeMonths)?;
//! let output = builder.build(&intent, &facilitator).await?;
//! assert_eq!(output.required_signers(), &[user, facilitator]);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

pub mod builder;
pub mod idl;
pub mod instructions;
pub mod output;

pub use builder::PurchaseTxBuilder;
pub use idl::{ProgramInterface, COMPLETE_PURCHASE_METHOD, CREATE_PURCHASE_METHOD};
pub use instructions::{
    completion_instruction, plain_transfer, BuildPath, InstructionPlan, PurchaseAccounts, PurchaseArgs,
    PurchaseProgram,
};
pub use output::BuildOutput;
