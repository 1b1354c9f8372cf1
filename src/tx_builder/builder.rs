//! Core purchase transaction builder
//!
//! Composes the interface schema, address derivation and instruction planning
//! into an unsigned transaction with the user as fee payer and a freshly
//! fetched liveness token. The only side effect is that network read.

use crate::metrics::{metrics, Timer};
use crate::quote::PurchaseIntent;
use crate::rpc::RpcBackend;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::idl::ProgramInterface;
use crate::tx_builder::instructions::{
    plan_purchase_instructions, validate_signer_set, BuildPath, InstructionPlan, PurchaseProgram,
};
use crate::tx_builder::output::BuildOutput;
use solana_sdk::{hash::Hash, message::Message, pubkey::Pubkey, transaction::Transaction};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PurchaseTxBuilder {
    program: PurchaseProgram,
    interface: Arc<ProgramInterface>,
    rpc: Arc<dyn RpcBackend>,
}

impl PurchaseTxBuilder {
    pub fn new(program: PurchaseProgram, interface: Arc<ProgramInterface>, rpc: Arc<dyn RpcBackend>) -> Self {
        Self {
            program,
            interface,
            rpc,
        }
    }

    pub fn program(&self) -> &PurchaseProgram {
        &self.program
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Plan instructions without touching the network
    pub fn plan(&self, intent: &PurchaseIntent, facilitator: &Pubkey) -> Result<InstructionPlan, TransactionBuilderError> {
        plan_purchase_instructions(&self.interface, &self.program, intent, facilitator)
    }

    /// Build the unsigned transaction for `intent`.
    ///
    /// Soft program-call failures yield a fallback transfer; a missing
    /// liveness token fails the build.
    pub async fn build(
        &self,
        intent: &PurchaseIntent,
        facilitator: &Pubkey,
    ) -> Result<BuildOutput, TransactionBuilderError> {
        let timer = Timer::new();
        let plan = self.plan(intent, facilitator)?;
        validate_signer_set(&plan.instructions, &[intent.wallet, *facilitator])?;

        let liveness = self.rpc.get_latest_liveness_token().await?;
        if liveness.blockhash == Hash::default() {
            return Err(TransactionBuilderError::blockhash_unavailable(format!(
                "{} returned an empty blockhash",
                self.rpc.endpoint()
            )));
        }
        debug!(
            blockhash = %liveness.blockhash,
            last_valid_block_height = liveness.last_valid_block_height,
            "Liveness token fetched"
        );

        let message = Message::new_with_blockhash(&plan.instructions, Some(&intent.wallet), &liveness.blockhash);
        let tx = Transaction::new_unsigned(message);

        if plan.path == BuildPath::FallbackTransfer {
            metrics().purchase_tx_fallback.inc();
        }
        timer.observe_duration(&metrics().build_latency);
        info!(
            wallet = %intent.wallet,
            lamports = intent.lamports(),
            duration = %intent.duration,
            path = %plan.path,
            "Purchase transaction built"
        );

        Ok(BuildOutput::new(tx, plan.path, liveness, plan.fallback_reason))
    }
}
