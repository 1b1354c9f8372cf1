//! Instruction planning for purchase transactions
//!
//! Two shapes are produced:
//! 1. **Program call**: one `createPurchaseTransaction` instruction whose
//!    accounts are resolved by name from the declared interface.
//! 2. **Fallback transfer**: one system transfer from the user to the
//!    treasury, used whenever the program call cannot be assembled.
//!
//! Either plan must require exactly two signatures: the user (fee payer) and
//! the facilitator.

use crate::pda::{associated_token_address, GovernanceAddresses};
use crate::quote::PurchaseIntent;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::idl::{
    to_snake_case, ArgType, ArgValue, InstructionSchema, ProgramInterface, COMPLETE_PURCHASE_METHOD,
    CREATE_PURCHASE_METHOD,
};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction, system_program,
};
use std::collections::BTreeSet;
use std::fmt;

/// Fixed addresses of the purchase deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseProgram {
    pub program_id: Pubkey,
    pub treasury: Pubkey,
    pub governance_program: Pubkey,
    pub realm: Pubkey,
    pub community_mint: Pubkey,
}

/// Which instruction shape a transaction carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildPath {
    ProgramCall,
    FallbackTransfer,
}

impl fmt::Display for BuildPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPath::ProgramCall => write!(f, "programCall"),
            BuildPath::FallbackTransfer => write!(f, "fallbackTransfer"),
        }
    }
}

/// Every address a purchase instruction may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseAccounts {
    pub user: Pubkey,
    pub facilitator: Pubkey,
    pub treasury: Pubkey,
    pub community_mint: Pubkey,
    pub facilitator_token_account: Pubkey,
    pub user_token_account: Pubkey,
    pub realm: Pubkey,
    pub governance: GovernanceAddresses,
    pub governance_program: Pubkey,
}

impl PurchaseAccounts {
    /// Derive all per-purchase addresses
    pub fn resolve(
        program: &PurchaseProgram,
        user: &Pubkey,
        facilitator: &Pubkey,
    ) -> Result<Self, TransactionBuilderError> {
        let governance = GovernanceAddresses::derive(
            &program.governance_program,
            &program.realm,
            &program.community_mint,
            user,
        )?;
        Ok(Self {
            user: *user,
            facilitator: *facilitator,
            treasury: program.treasury,
            community_mint: program.community_mint,
            facilitator_token_account: associated_token_address(facilitator, &program.community_mint)?,
            user_token_account: associated_token_address(user, &program.community_mint)?,
            realm: program.realm,
            governance,
            governance_program: program.governance_program,
        })
    }

    /// Look up an account by its interface name (camelCase or snake_case)
    pub fn lookup(&self, name: &str) -> Option<Pubkey> {
        let key = match to_snake_case(name).as_str() {
            "user" => self.user,
            "admin" | "facilitator" => self.facilitator,
            "treasury" => self.treasury,
            "community_mint" => self.community_mint,
            "admin_token_account" | "facilitator_token_account" => self.facilitator_token_account,
            "user_token_account" => self.user_token_account,
            "realm" => self.realm,
            "realm_config" => self.governance.realm_config.address,
            "governing_token_holding" => self.governance.governing_token_holding.address,
            "governance_token_account" => self.governance.governance_token_account.address,
            "token_owner_record" => self.governance.token_owner_record.address,
            "system_program" => system_program::id(),
            "token_program" => spl_token::id(),
            "associated_token_program" => spl_associated_token_account::id(),
            "governance_program" => self.governance_program,
            _ => return None,
        };
        Some(key)
    }
}

/// Ordered instructions plus which path produced them
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    pub path: BuildPath,
    /// Why the program call was abandoned, for fallback plans
    pub fallback_reason: Option<String>,
}

impl InstructionPlan {
    pub fn program_call(ix: Instruction) -> Self {
        Self {
            instructions: vec![ix],
            path: BuildPath::ProgramCall,
            fallback_reason: None,
        }
    }

    pub fn fallback(ix: Instruction, reason: impl Into<String>) -> Self {
        Self {
            instructions: vec![ix],
            path: BuildPath::FallbackTransfer,
            fallback_reason: Some(reason.into()),
        }
    }
}

/// Values available for a program call's declared arguments
#[derive(Debug, Clone, Copy)]
pub struct PurchaseArgs<'a> {
    pub intent: &'a PurchaseIntent,
    /// Signature of the purchase being completed, for `completePurchase`
    pub transaction_signature: Option<&'a str>,
}

impl<'a> PurchaseArgs<'a> {
    pub fn for_intent(intent: &'a PurchaseIntent) -> Self {
        Self {
            intent,
            transaction_signature: None,
        }
    }

    fn value(&self, name: &str) -> Option<ArgValue> {
        match to_snake_case(name).as_str() {
            "sol_amount" | "lamports" | "amount" => Some(ArgValue::Uint(self.intent.lamports())),
            "lock_duration_months" | "lock_duration" => {
                Some(ArgValue::Uint(u64::from(self.intent.duration.months())))
            }
            "user" | "wallet" => Some(ArgValue::Key(self.intent.wallet)),
            "transaction_signature" | "signature" => {
                self.transaction_signature.map(|s| ArgValue::Str(s.to_string()))
            }
            _ => None,
        }
    }
}

/// Assemble one program instruction from its declared schema.
///
/// Every signer-flagged account must be one of `signers`.
pub fn build_program_call(
    schema: &InstructionSchema,
    program_id: &Pubkey,
    accounts: &PurchaseAccounts,
    args: &PurchaseArgs<'_>,
    signers: &[Pubkey],
) -> Result<Instruction, TransactionBuilderError> {
    let mut metas = Vec::with_capacity(schema.accounts.len());
    for declared in &schema.accounts {
        let pubkey = accounts.lookup(&declared.name).ok_or_else(|| {
            TransactionBuilderError::shape(
                &schema.name,
                format!("no address for declared account '{}'", declared.name),
            )
        })?;
        if declared.is_signer && !signers.contains(&pubkey) {
            return Err(TransactionBuilderError::shape(
                &schema.name,
                format!("account '{}' must sign but nobody holds its key", declared.name),
            ));
        }
        metas.push(if declared.is_mut {
            AccountMeta::new(pubkey, declared.is_signer)
        } else {
            AccountMeta::new_readonly(pubkey, declared.is_signer)
        });
    }

    let mut data = schema.discriminator().to_vec();
    for arg in &schema.args {
        let ty = ArgType::from_idl(&arg.ty).map_err(|e| {
            TransactionBuilderError::instruction_failed(program_id.to_string(), e.to_string())
        })?;
        let value = args.value(&arg.name).ok_or_else(|| {
            TransactionBuilderError::instruction_failed(
                program_id.to_string(),
                format!("no value for declared argument '{}'", arg.name),
            )
        })?;
        value.encode_as(ty, &arg.name, &mut data)?;
    }

    Ok(Instruction::new_with_bytes(*program_id, &data, metas))
}

/// `completePurchase` notice, signed by the facilitator alone
pub fn completion_instruction(
    interface: &ProgramInterface,
    program: &PurchaseProgram,
    intent: &PurchaseIntent,
    transaction_signature: &str,
    facilitator: &Pubkey,
) -> Result<Instruction, TransactionBuilderError> {
    let schema = interface.instruction(COMPLETE_PURCHASE_METHOD)?;
    let accounts = PurchaseAccounts::resolve(program, &intent.wallet, facilitator)?;
    let args = PurchaseArgs {
        intent,
        transaction_signature: Some(transaction_signature),
    };
    build_program_call(schema, &program.program_id, &accounts, &args, &[*facilitator])
}

/// Plain transfer from user to treasury, co-signed by the facilitator.
///
/// The facilitator is appended as a read-only signer; the system program
/// ignores accounts beyond the two it reads.
pub fn plain_transfer(user: &Pubkey, treasury: &Pubkey, lamports: u64, facilitator: &Pubkey) -> Instruction {
    let mut ix = system_instruction::transfer(user, treasury, lamports);
    ix.accounts.push(AccountMeta::new_readonly(*facilitator, true));
    ix
}

/// Plan the purchase: program call if possible, plain transfer otherwise.
///
/// Only soft failures of the program path lead to the fallback; derivation
/// exhaustion and other hard failures are returned.
pub fn plan_purchase_instructions(
    interface: &ProgramInterface,
    program: &PurchaseProgram,
    intent: &PurchaseIntent,
    facilitator: &Pubkey,
) -> Result<InstructionPlan, TransactionBuilderError> {
    let accounts = PurchaseAccounts::resolve(program, &intent.wallet, facilitator)?;

    let signers = [intent.wallet, *facilitator];
    let attempt = interface
        .instruction(CREATE_PURCHASE_METHOD)
        .and_then(|schema| {
            let ix = build_program_call(
                schema,
                &program.program_id,
                &accounts,
                &PurchaseArgs::for_intent(intent),
                &signers,
            )?;
            // Both parties must hold a slot
            validate_signer_set(std::slice::from_ref(&ix), &signers)
                .map_err(|e| TransactionBuilderError::shape(&schema.name, e.to_string()))?;
            Ok(ix)
        });

    match attempt {
        Ok(ix) => Ok(InstructionPlan::program_call(ix)),
        Err(e) if e.is_soft() => {
            tracing::warn!(
                wallet = %intent.wallet,
                error = %e,
                "Program call unavailable, falling back to plain transfer"
            );
            let ix = plain_transfer(&intent.wallet, &program.treasury, intent.lamports(), facilitator);
            Ok(InstructionPlan::fallback(ix, e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// The distinct signer-flagged accounts across `instructions`
pub fn signer_set(instructions: &[Instruction]) -> BTreeSet<Pubkey> {
    instructions
        .iter()
        .flat_map(|ix| ix.accounts.iter())
        .filter(|meta| meta.is_signer)
        .map(|meta| meta.pubkey)
        .collect()
}

/// Check that the signer set is exactly `expected`
pub fn validate_signer_set(
    instructions: &[Instruction],
    expected: &[Pubkey],
) -> Result<(), TransactionBuilderError> {
    let actual = signer_set(instructions);
    let wanted: BTreeSet<Pubkey> = expected.iter().copied().collect();
    if actual != wanted {
        let fmt_set = |s: &BTreeSet<Pubkey>| {
            s.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(",")
        };
        return Err(TransactionBuilderError::InvalidSignerSet(format!(
            "expected [{}], got [{}]",
            fmt_set(&wanted),
            fmt_set(&actual)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::LockDuration;
    use solana_sdk::system_instruction::SystemInstruction;

    fn program() -> PurchaseProgram {
        PurchaseProgram {
            program_id: Pubkey::new_unique(),
            treasury: Pubkey::new_unique(),
            governance_program: Pubkey::new_unique(),
            realm: Pubkey::new_unique(),
            community_mint: Pubkey::new_unique(),
        }
    }

    fn intent(sol: f64) -> PurchaseIntent {
        PurchaseIntent::new(Pubkey::new_unique(), sol, LockDuration::ThreeMonths).unwrap()
    }

    #[test]
    fn test_program_call_account_order_and_flags() {
        let program = program();
        let intent = intent(2.0);
        let facilitator = Pubkey::new_unique();
        let plan =
            plan_purchase_instructions(&ProgramInterface::builtin(), &program, &intent, &facilitator).unwrap();

        assert_eq!(plan.path, BuildPath::ProgramCall);
        assert_eq!(plan.instructions.len(), 1);
        let ix = &plan.instructions[0];
        assert_eq!(ix.program_id, program.program_id);
        assert_eq!(ix.accounts.len(), 15);
        assert_eq!(ix.accounts[0], AccountMeta::new(intent.wallet, true));
        assert_eq!(ix.accounts[1], AccountMeta::new(facilitator, true));
        assert_eq!(ix.accounts[2], AccountMeta::new(program.treasury, false));
        assert_eq!(ix.accounts[3], AccountMeta::new_readonly(program.community_mint, false));
        assert_eq!(ix.accounts[11], AccountMeta::new_readonly(system_program::id(), false));
        assert_eq!(ix.accounts[14], AccountMeta::new_readonly(program.governance_program, false));

        // discriminator + u64 lamports + u8 months
        assert_eq!(ix.data.len(), 8 + 8 + 1);
        assert_eq!(&ix.data[8..16], &2_000_000_000u64.to_le_bytes());
        assert_eq!(ix.data[16], 3);
        assert_eq!(
            signer_set(&plan.instructions),
            [intent.wallet, facilitator].into_iter().collect()
        );
    }

    #[test]
    fn test_unknown_method_falls_back_to_single_transfer() {
        let program = program();
        let intent = intent(0.005);
        let facilitator = Pubkey::new_unique();
        let iface = ProgramInterface::from_json(r#"{"name":"other","instructions":[]}"#).unwrap();

        let plan = plan_purchase_instructions(&iface, &program, &intent, &facilitator).unwrap();
        assert_eq!(plan.path, BuildPath::FallbackTransfer);
        assert!(plan.fallback_reason.unwrap().contains("Unknown program method"));
        assert_eq!(plan.instructions.len(), 1);

        let ix = &plan.instructions[0];
        assert_eq!(ix.program_id, system_program::id());
        assert_eq!(ix.accounts[0].pubkey, intent.wallet);
        assert_eq!(ix.accounts[1].pubkey, program.treasury);
        let decoded: SystemInstruction = bincode::deserialize(&ix.data).unwrap();
        assert_eq!(decoded, SystemInstruction::Transfer { lamports: 5_000_000 });
        assert_eq!(
            signer_set(&plan.instructions),
            [intent.wallet, facilitator].into_iter().collect()
        );
    }

    #[test]
    fn test_unresolvable_account_is_soft() {
        let json = r#"{"name":"token_purchase","instructions":[{
            "name":"createPurchaseTransaction",
            "accounts":[{"name":"user","isMut":true,"isSigner":true},
                        {"name":"oracle","isMut":false,"isSigner":false}],
            "args":[]}]}"#;
        let plan = plan_purchase_instructions(
            &ProgramInterface::from_json(json).unwrap(),
            &program(),
            &intent(1.0),
            &Pubkey::new_unique(),
        )
        .unwrap();
        assert_eq!(plan.path, BuildPath::FallbackTransfer);
    }

    #[test]
    fn test_missing_facilitator_signer_is_soft() {
        // facilitator never asked to sign: the partial signature would have no slot
        let json = r#"{"name":"token_purchase","instructions":[{
            "name":"createPurchaseTransaction",
            "accounts":[{"name":"user","isMut":true,"isSigner":true}],
            "args":[{"name":"solAmount","type":"u64"}]}]}"#;
        let plan = plan_purchase_instructions(
            &ProgramInterface::from_json(json).unwrap(),
            &program(),
            &intent(1.0),
            &Pubkey::new_unique(),
        )
        .unwrap();
        assert_eq!(plan.path, BuildPath::FallbackTransfer);
    }

    #[test]
    fn test_unsupported_arg_type_is_soft() {
        let json = r#"{"name":"token_purchase","instructions":[{
            "name":"createPurchaseTransaction",
            "accounts":[{"name":"user","isMut":true,"isSigner":true},
                        {"name":"admin","isMut":true,"isSigner":true}],
            "args":[{"name":"solAmount","type":{"option":"u64"}}]}]}"#;
        let plan = plan_purchase_instructions(
            &ProgramInterface::from_json(json).unwrap(),
            &program(),
            &intent(1.0),
            &Pubkey::new_unique(),
        )
        .unwrap();
        assert_eq!(plan.path, BuildPath::FallbackTransfer);
    }

    #[test]
    fn test_lookup_names() {
        let accounts = PurchaseAccounts::resolve(&program(), &Pubkey::new_unique(), &Pubkey::new_unique()).unwrap();
        assert_eq!(accounts.lookup("communityMint"), Some(accounts.community_mint));
        assert_eq!(accounts.lookup("community_mint"), Some(accounts.community_mint));
        assert_eq!(accounts.lookup("tokenProgram"), Some(spl_token::id()));
        assert_eq!(accounts.lookup("oracle"), None);
    }

    #[test]
    fn test_completion_instruction_encodes_signature() {
        let program = program();
        let intent = intent(2.0);
        let facilitator = Pubkey::new_unique();
        let ix = completion_instruction(
            &ProgramInterface::builtin(),
            &program,
            &intent,
            "5sig",
            &facilitator,
        )
        .unwrap();

        assert_eq!(ix.accounts, vec![
            AccountMeta::new_readonly(intent.wallet, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ]);
        // discriminator + u64 + u8 + (u32 len + "5sig")
        assert_eq!(ix.data.len(), 8 + 8 + 1 + 4 + 4);
        assert_eq!(&ix.data[ix.data.len() - 4..], b"5sig");
    }

    #[test]
    fn test_validate_signer_set() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let ix = plain_transfer(&a, &Pubkey::new_unique(), 1, &b);
        assert!(validate_signer_set(&[ix.clone()], &[a, b]).is_ok());
        assert!(matches!(
            validate_signer_set(&[ix], &[a]),
            Err(TransactionBuilderError::InvalidSignerSet(_))
        ));
    }
}
