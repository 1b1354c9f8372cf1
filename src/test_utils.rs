//! Test Utilities Module
//!
//! Scripted stand-ins for the network and the user's wallet, so purchase
//! flows can be driven deterministically.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::codec;
use crate::rpc::{
    Durability, LandedTransaction, LivenessToken, RpcBackend, RpcManagerError, SendOptions,
    SignatureStatus,
};
use crate::signer::{WalletCapability, WalletError};
use crate::tx_builder::PurchaseProgram;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type StatusResult = Result<Option<SignatureStatus>, RpcManagerError>;

#[derive(Debug)]
struct MockRpcState {
    liveness: Result<LivenessToken, RpcManagerError>,
    send_script: VecDeque<Result<(), RpcManagerError>>,
    sent: Vec<Vec<u8>>,
    status_script: VecDeque<StatusResult>,
    default_status: StatusResult,
    status_delay: Option<Duration>,
    transactions: HashMap<Signature, LandedTransaction>,
    transaction_error: Option<RpcManagerError>,
    balances: HashMap<Pubkey, u64>,
    auto_confirm: bool,
}

/// Scripted RPC backend
///
/// Unscripted sends succeed and return the transaction's first signature.
/// With [`MockRpc::auto_confirm`] every accepted transaction also becomes
/// visible as confirmed to status and lookup queries.
#[derive(Debug)]
pub struct MockRpc {
    state: Mutex<MockRpcState>,
    liveness_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockRpcState {
                liveness: Ok(LivenessToken {
                    blockhash: Hash::new_unique(),
                    last_valid_block_height: 1_000,
                }),
                send_script: VecDeque::new(),
                sent: Vec::new(),
                status_script: VecDeque::new(),
                default_status: Ok(None),
                status_delay: None,
                transactions: HashMap::new(),
                transaction_error: None,
                balances: HashMap::new(),
                auto_confirm: false,
            }),
            liveness_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn auto_confirm(&self) {
        self.state.lock().auto_confirm = true;
    }

    pub fn set_liveness(&self, token: LivenessToken) {
        self.state.lock().liveness = Ok(token);
    }

    pub fn fail_liveness(&self, err: RpcManagerError) {
        self.state.lock().liveness = Err(err);
    }

    pub fn liveness_calls(&self) -> usize {
        self.liveness_calls.load(Ordering::SeqCst)
    }

    /// Outcomes for the next sends, in order
    pub fn script_send(&self, outcomes: Vec<Result<(), RpcManagerError>>) {
        self.state.lock().send_script.extend(outcomes);
    }

    /// Wire bytes of every send attempt
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn script_status(&self, outcomes: Vec<StatusResult>) {
        self.state.lock().status_script.extend(outcomes);
    }

    pub fn set_default_status(&self, status: StatusResult) {
        self.state.lock().default_status = status;
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.state.lock().status_delay = Some(delay);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn insert_transaction(&self, signature: Signature, landed: LandedTransaction) {
        self.state.lock().transactions.insert(signature, landed);
    }

    pub fn fail_get_transaction(&self, err: RpcManagerError) {
        self.state.lock().transaction_error = Some(err);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().balances.insert(address, lamports);
    }
}

#[async_trait]
impl RpcBackend for MockRpc {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcManagerError> {
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    async fn get_latest_liveness_token(&self) -> Result<LivenessToken, RpcManagerError> {
        self.liveness_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().liveness.clone()
    }

    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        _options: &SendOptions,
    ) -> Result<Signature, RpcManagerError> {
        let mut state = self.state.lock();
        state.sent.push(wire.to_vec());
        state.send_script.pop_front().unwrap_or(Ok(()))?;

        let tx = codec::from_wire_bytes(wire).map_err(|e| RpcManagerError::Malformed(e.to_string()))?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| RpcManagerError::Malformed("transaction has no signatures".into()))?;
        if state.auto_confirm {
            state.transactions.insert(
                signature,
                LandedTransaction {
                    slot: 42,
                    block_time: None,
                    err: None,
                },
            );
        }
        Ok(signature)
    }

    async fn get_signature_status(&self, signature: &Signature) -> StatusResult {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(next) = state.status_script.pop_front() {
            return next;
        }
        if let Some(landed) = state.transactions.get(signature) {
            return Ok(Some(SignatureStatus {
                slot: landed.slot,
                durability: Durability::Confirmed,
                err: landed.err.clone(),
            }));
        }
        state.default_status.clone()
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<LandedTransaction>, RpcManagerError> {
        let state = self.state.lock();
        if let Some(err) = &state.transaction_error {
            return Err(err.clone());
        }
        Ok(state.transactions.get(signature).cloned())
    }
}

/// How a [`MockWallet`] answers a signing request
#[derive(Debug, Clone, PartialEq)]
pub enum WalletBehavior {
    Sign,
    Reject,
    /// Signs a different message than the one it was handed
    AlterMessage,
    Fail(String),
    /// Never answers
    Hang,
}

#[derive(Debug)]
pub struct MockWallet {
    keypair: Keypair,
    behavior: WalletBehavior,
    connected: AtomicBool,
}

impl MockWallet {
    pub fn new(keypair: Keypair, behavior: WalletBehavior) -> Self {
        Self {
            keypair,
            behavior,
            connected: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletCapability for MockWallet {
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
        match &self.behavior {
            WalletBehavior::Sign => {
                let blockhash = tx.message.recent_blockhash;
                tx.try_partial_sign(&[&self.keypair], blockhash)
                    .map_err(|e| WalletError::Other(e.to_string()))?;
                Ok(tx)
            }
            WalletBehavior::Reject => Err(WalletError::Rejected("User rejected the request.".into())),
            WalletBehavior::AlterMessage => {
                let blockhash = Hash::new_unique();
                tx.message.recent_blockhash = blockhash;
                tx.try_partial_sign(&[&self.keypair], blockhash)
                    .map_err(|e| WalletError::Other(e.to_string()))?;
                Ok(tx)
            }
            WalletBehavior::Fail(message) => Err(WalletError::Other(message.clone())),
            WalletBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Fully signed two-signer transfer
pub fn signed_transfer() -> Transaction {
    let payer = Keypair::new();
    let cosigner = Keypair::new();
    let mut ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1_000);
    ix.accounts
        .push(solana_sdk::instruction::AccountMeta::new_readonly(cosigner.pubkey(), true));
    let message = Message::new(&[ix], Some(&payer.pubkey()));
    Transaction::new(&[&payer, &cosigner], message, Hash::new_unique())
}

pub fn test_program() -> PurchaseProgram {
    PurchaseProgram {
        program_id: Pubkey::new_unique(),
        treasury: Pubkey::new_unique(),
        governance_program: Pubkey::new_unique(),
        realm: Pubkey::new_unique(),
        community_mint: Pubkey::new_unique(),
    }
}
