//! Two-party signing
//!
//! The facilitator signs on the server before the transaction crosses the
//! transport boundary; the user's wallet signs on the client after. Both
//! sides check that nothing but their own slot changed.

pub mod client;
pub mod errors;
pub mod facilitator;
pub mod wallet;

pub use client::ClientCoSigner;
pub use errors::SigningError;
pub use facilitator::{read_keypair_file, FacilitatorSigner};
pub use wallet::{KeypairWallet, WalletCapability, WalletError};
