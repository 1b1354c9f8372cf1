//! Program interface schema
//!
//! Anchor-style interface description of the purchase program: method names,
//! ordered accounts with mutability/signer flags, and typed arguments. Loaded
//! once at startup. An unreadable or incompatible schema never crashes the
//! service; it turns every program-call attempt into a soft failure so the
//! builder falls back to a plain transfer.

use crate::tx_builder::errors::TransactionBuilderError;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;

pub const CREATE_PURCHASE_METHOD: &str = "createPurchaseTransaction";
pub const COMPLETE_PURCHASE_METHOD: &str = "completePurchase";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountSchema {
    pub name: String,
    #[serde(rename = "isMut", default)]
    pub is_mut: bool,
    #[serde(rename = "isSigner", default)]
    pub is_signer: bool,
}

impl AccountSchema {
    fn new(name: &str, is_mut: bool, is_signer: bool) -> Self {
        Self {
            name: name.to_string(),
            is_mut,
            is_signer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArgSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstructionSchema {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<AccountSchema>,
    #[serde(default)]
    pub args: Vec<ArgSchema>,
}

impl InstructionSchema {
    /// `sha256("global:<snake_case name>")[..8]`
    pub fn discriminator(&self) -> [u8; 8] {
        let preimage = format!("global:{}", to_snake_case(&self.name));
        let hash = Sha256::digest(preimage.as_bytes());
        let mut out = [0u8; 8];
        out.copy_from_slice(&hash[..8]);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct IdlDocument {
    #[serde(default)]
    name: String,
    instructions: Vec<InstructionSchema>,
}

/// Argument types the encoder supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    U8,
    U16,
    U32,
    U64,
    I64,
    Bool,
    String,
    PublicKey,
}

impl ArgType {
    pub fn from_idl(ty: &Value) -> Result<Self, TransactionBuilderError> {
        match ty.as_str() {
            Some("u8") => Ok(Self::U8),
            Some("u16") => Ok(Self::U16),
            Some("u32") => Ok(Self::U32),
            Some("u64") => Ok(Self::U64),
            Some("i64") => Ok(Self::I64),
            Some("bool") => Ok(Self::Bool),
            Some("string") => Ok(Self::String),
            Some("publicKey") | Some("pubkey") => Ok(Self::PublicKey),
            _ => Err(TransactionBuilderError::Interface(format!(
                "unsupported argument type {}",
                ty
            ))),
        }
    }
}

/// A value supplied by the caller for a declared argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Uint(u64),
    Int(i64),
    Bool(bool),
    Str(String),
    Key(Pubkey),
}

impl ArgValue {
    /// Borsh-encode this value as the declared type
    pub fn encode_as(&self, ty: ArgType, name: &str, out: &mut Vec<u8>) -> Result<(), TransactionBuilderError> {
        let mismatch = || {
            TransactionBuilderError::instruction_failed(
                "purchase_program",
                format!("argument '{}' cannot be encoded as {:?} from {:?}", name, ty, self),
            )
        };
        match (ty, self) {
            (ArgType::U8, ArgValue::Uint(v)) => out.push(u8::try_from(*v).map_err(|_| mismatch())?),
            (ArgType::U16, ArgValue::Uint(v)) => {
                out.extend_from_slice(&u16::try_from(*v).map_err(|_| mismatch())?.to_le_bytes())
            }
            (ArgType::U32, ArgValue::Uint(v)) => {
                out.extend_from_slice(&u32::try_from(*v).map_err(|_| mismatch())?.to_le_bytes())
            }
            (ArgType::U64, ArgValue::Uint(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ArgType::I64, ArgValue::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ArgType::I64, ArgValue::Uint(v)) => {
                out.extend_from_slice(&i64::try_from(*v).map_err(|_| mismatch())?.to_le_bytes())
            }
            (ArgType::Bool, ArgValue::Bool(b)) => out.push(u8::from(*b)),
            (ArgType::String, ArgValue::Str(s)) => {
                let len = u32::try_from(s.len()).map_err(|_| mismatch())?;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            (ArgType::PublicKey, ArgValue::Key(k)) => out.extend_from_slice(k.as_ref()),
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

/// Declared interface of the on-chain purchase program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInterface {
    name: String,
    instructions: Vec<InstructionSchema>,
    load_error: Option<String>,
}

impl ProgramInterface {
    /// Schema of the deployed purchase program
    pub fn builtin() -> Self {
        let create = InstructionSchema {
            name: CREATE_PURCHASE_METHOD.to_string(),
            accounts: vec![
                AccountSchema::new("user", true, true),
                AccountSchema::new("admin", true, true),
                AccountSchema::new("treasury", true, false),
                AccountSchema::new("communityMint", false, false),
                AccountSchema::new("adminTokenAccount", true, false),
                AccountSchema::new("userTokenAccount", true, false),
                AccountSchema::new("realm", false, false),
                AccountSchema::new("realmConfig", false, false),
                AccountSchema::new("governingTokenHolding", true, false),
                AccountSchema::new("governanceTokenAccount", true, false),
                AccountSchema::new("tokenOwnerRecord", true, false),
                AccountSchema::new("systemProgram", false, false),
                AccountSchema::new("tokenProgram", false, false),
                AccountSchema::new("associatedTokenProgram", false, false),
                AccountSchema::new("governanceProgram", false, false),
            ],
            args: vec![
                ArgSchema {
                    name: "solAmount".into(),
                    ty: Value::from("u64"),
                },
                ArgSchema {
                    name: "lockDurationMonths".into(),
                    ty: Value::from("u8"),
                },
            ],
        };
        let complete = InstructionSchema {
            name: COMPLETE_PURCHASE_METHOD.to_string(),
            accounts: vec![
                AccountSchema::new("user", false, false),
                AccountSchema::new("systemProgram", false, false),
            ],
            args: vec![
                ArgSchema {
                    name: "solAmount".into(),
                    ty: Value::from("u64"),
                },
                ArgSchema {
                    name: "lockDurationMonths".into(),
                    ty: Value::from("u8"),
                },
                ArgSchema {
                    name: "transactionSignature".into(),
                    ty: Value::from("string"),
                },
            ],
        };
        Self {
            name: "token_purchase".to_string(),
            instructions: vec![create, complete],
            load_error: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TransactionBuilderError> {
        let doc: IdlDocument = serde_json::from_str(json)
            .map_err(|e| TransactionBuilderError::Interface(format!("invalid IDL: {}", e)))?;
        Ok(Self {
            name: doc.name,
            instructions: doc.instructions,
            load_error: None,
        })
    }

    /// Load from disk; an unusable document yields an interface on which every
    /// lookup fails softly
    pub fn load(path: &Path) -> Self {
        let loaded = std::fs::read_to_string(path)
            .map_err(|e| {
                TransactionBuilderError::Interface(format!("cannot read {}: {}", path.display(), e))
            })
            .and_then(|s| Self::from_json(&s));
        match loaded {
            Ok(interface) => {
                tracing::info!(
                    program = %interface.name,
                    instructions = interface.instructions.len(),
                    path = %path.display(),
                    "Program interface loaded"
                );
                for ix in &interface.instructions {
                    tracing::debug!(method = %ix.name, accounts = ix.accounts.len(), args = ix.args.len(), "Declared instruction");
                }
                interface
            }
            Err(e) => {
                tracing::error!(error = %e, "Program interface unusable; purchases will use transfer fallback");
                Self {
                    name: String::new(),
                    instructions: Vec::new(),
                    load_error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_usable(&self) -> bool {
        self.load_error.is_none()
    }

    pub fn instruction(&self, method: &str) -> Result<&InstructionSchema, TransactionBuilderError> {
        if let Some(err) = &self.load_error {
            return Err(TransactionBuilderError::Interface(err.clone()));
        }
        self.instructions
            .iter()
            .find(|ix| ix.name == method || to_snake_case(&ix.name) == to_snake_case(method))
            .ok_or_else(|| TransactionBuilderError::UnknownMethod(method.to_string()))
    }
}

/// `createPurchaseTransaction` -> `create_purchase_transaction`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
