//! Configuration module for the purchase facilitator
//!
//! This module handles configuration loading from TOML files, `.env` and
//! environment variables, and validates the result before anything starts.

use crate::confirmation::{DEFAULT_DEADLINE, DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_TIMEOUT};
use crate::rpc::RetryPolicy;
use crate::submit::SubmitConfig;
use crate::tx_builder::PurchaseProgram;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_RPC_URL: &str = "FACILITATOR_RPC_URL";
pub const ENV_KEYPAIR: &str = "FACILITATOR_KEYPAIR";
pub const ENV_BIND: &str = "FACILITATOR_BIND";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rpc: RpcConfig,
    pub facilitator: FacilitatorConfig,
    pub program: ProgramConfig,
    pub submit: SubmitSection,
    pub confirmation: ConfirmationConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// Commitment used for reads (`processed`, `confirmed`, `finalized`)
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Path to the facilitator keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(default = "default_program_id")]
    pub program_id: String,
    #[serde(default = "default_treasury")]
    pub treasury: String,
    #[serde(default = "default_governance_program")]
    pub governance_program: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default = "default_community_mint")]
    pub community_mint: String,

    /// Interface document; the built-in schema is used when unset
    #[serde(default)]
    pub idl_path: Option<String>,

    /// Send a best-effort `completePurchase` notice after recording
    #[serde(default)]
    pub record_on_chain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitSection {
    #[serde(default = "default_true")]
    pub skip_preflight: bool,
    #[serde(default = "default_max_send_retries")]
    pub max_retries: usize,
    #[serde(default)]
    pub backoff: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-call status timeout; must be shorter than the poll interval
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit logs as JSON; the `--json-logs` flag can also turn this on
    #[serde(default)]
    pub json_logs: bool,
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_rpc_timeout_ms() -> u64 { 30_000 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_keypair_path() -> String { "admin-keypair.json".to_string() }
fn default_program_id() -> String { "9HgVgT5AQ9WdCcZPMgzG8j26892YBjvHFEFL33xk4tb7".to_string() }
fn default_treasury() -> String { "4WpsT2QvtjuYh4y9ggDRBPVDJseF98f26ke3DSXptCXt".to_string() }
fn default_governance_program() -> String { "GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw".to_string() }
fn default_realm() -> String { "5Zjr7Be8fdrbfG9B2uZYxqyrwawFBpPy1Zkgd3RxwEUk".to_string() }
fn default_community_mint() -> String { "JCTnoqWEEoWz4cBuPEF6KgK1Zc8YyBoHSm5u2FBQvHHA".to_string() }
fn default_max_send_retries() -> usize { 5 }
fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL.as_millis() as u64 }
fn default_status_timeout_ms() -> u64 { DEFAULT_STATUS_TIMEOUT.as_millis() as u64 }
fn default_deadline_secs() -> u64 { DEFAULT_DEADLINE.as_secs() }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_ms: default_rpc_timeout_ms(),
            commitment: default_commitment(),
        }
    }
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: default_program_id(),
            treasury: default_treasury(),
            governance_program: default_governance_program(),
            realm: default_realm(),
            community_mint: default_community_mint(),
            idl_path: None,
            record_on_chain: false,
        }
    }
}

impl Default for SubmitSection {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            max_retries: default_max_send_retries(),
            backoff: RetryPolicy::default(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_timeout_ms: default_status_timeout_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            json_logs: false,
        }
    }
}

fn parse_key(field: &'static str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value).map_err(|e| ConfigError::invalid(field, format!("'{}': {}", value, e)))
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `.env`, then the file if it exists, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(path) = lookup(ENV_KEYPAIR) {
            self.facilitator.keypair_path = path;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.purchase_program()?;
        self.commitment()?;

        if self.rpc.url.trim().is_empty() {
            return Err(ConfigError::invalid("rpc.url", "must not be empty"));
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "server.bind",
                format!("'{}' is not a socket address", self.server.bind),
            ));
        }
        let c = &self.confirmation;
        if c.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("confirmation.poll_interval_ms", "must be positive"));
        }
        if c.status_timeout_ms >= c.poll_interval_ms {
            return Err(ConfigError::invalid(
                "confirmation.status_timeout_ms",
                format!(
                    "{}ms must be shorter than the poll interval ({}ms)",
                    c.status_timeout_ms, c.poll_interval_ms
                ),
            ));
        }
        if c.deadline_secs == 0 {
            return Err(ConfigError::invalid("confirmation.deadline_secs", "must be positive"));
        }
        if self.submit.backoff.max_attempts == 0 {
            return Err(ConfigError::invalid("submit.backoff.max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn purchase_program(&self) -> Result<PurchaseProgram, ConfigError> {
        let p = &self.program;
        Ok(PurchaseProgram {
            program_id: parse_key("program.program_id", &p.program_id)?,
            treasury: parse_key("program.treasury", &p.treasury)?,
            governance_program: parse_key("program.governance_program", &p.governance_program)?,
            realm: parse_key("program.realm", &p.realm)?,
            community_mint: parse_key("program.community_mint", &p.community_mint)?,
        })
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        let level = match self.rpc.commitment.as_str() {
            "processed" => CommitmentLevel::Processed,
            "confirmed" => CommitmentLevel::Confirmed,
            "finalized" => CommitmentLevel::Finalized,
            other => {
                return Err(ConfigError::invalid(
                    "rpc.commitment",
                    format!("'{}' is not processed, confirmed or finalized", other),
                ))
            }
        };
        Ok(CommitmentConfig { commitment: level })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    /// JSON logging is on if either the file or the command line asks for it
    pub fn json_logs(&self, cli_flag: bool) -> bool {
        cli_flag || self.monitoring.json_logs
    }

    pub fn submit_config(&self) -> SubmitConfig {
        SubmitConfig {
            skip_preflight: self.submit.skip_preflight,
            preflight_commitment: CommitmentLevel::Processed,
            max_retries: Some(self.submit.max_retries),
            retry: self.submit.backoff.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation.poll_interval_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation.status_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.confirmation.deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.deadline(), Duration::from_secs(60));
        assert!(config.status_timeout() < config.poll_interval());
        assert_eq!(
            config.purchase_program().unwrap().treasury.to_string(),
            "4WpsT2QvtjuYh4y9ggDRBPVDJseF98f26ke3DSXptCXt"
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [rpc]
            url = "http://127.0.0.1:8899"

            [confirmation]
            deadline_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(config.rpc.url, "http://127.0.0.1:8899");
        assert_eq!(config.rpc.commitment, "confirmed");
        assert_eq!(config.confirmation.deadline_secs, 90);
        assert_eq!(config.confirmation.poll_interval_ms, 2000);
        assert!(config.submit.skip_preflight);
    }

    #[test]
    fn test_status_timeout_must_be_shorter_than_interval() {
        let mut config = Config::default();
        config.confirmation.status_timeout_ms = 2000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confirmation.status_timeout_ms"));
    }

    #[test]
    fn test_bad_address_rejected() {
        let mut config = Config::default();
        config.program.realm = "not-a-key".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "program.realm", .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_RPC_URL, "http://localhost:8899"),
            (ENV_BIND, "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.rpc.url, "http://localhost:8899");
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.facilitator.keypair_path, "admin-keypair.json");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[submit]\nmax_retries = 2\n[monitoring]\njson_logs = true").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.submit_config().max_retries, Some(2));
        assert!(config.monitoring.json_logs);
        assert!(config.json_logs(false));
        assert!(Config::default().json_logs(true));
        assert!(!Config::default().json_logs(false));

        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/config.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
