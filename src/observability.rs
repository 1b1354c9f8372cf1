//! Observability module for correlation and structured logging

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Correlation ID for tracking requests across components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structured logger for purchase pipeline events
#[derive(Debug, Clone)]
pub struct PurchaseLogger {
    correlation_id: CorrelationId,
}

impl PurchaseLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_build_requested(&self, wallet: &str, sol_amount: f64, months: u8) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            wallet = %wallet,
            sol_amount = %sol_amount,
            lock_duration_months = %months,
            "Purchase transaction requested"
        );
    }

    pub fn log_build_ready(&self, wallet: &str, path: &str, token_amount: f64, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            wallet = %wallet,
            path = %path,
            token_amount = %token_amount,
            latency_ms = %latency_ms,
            "Partially signed transaction ready"
        );
    }

    pub fn log_request_rejected(&self, operation: &str, category: &str, error: &str) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = %operation,
            category = %category,
            error = %error,
            "Request rejected"
        );
    }

    pub fn log_purchase_recorded(&self, wallet: &str, signature: &str, record_id: &str) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            wallet = %wallet,
            signature = %signature,
            record_id = %record_id,
            "Purchase recorded"
        );
    }

    /// Everything needed to reconcile the ledger by hand
    pub fn log_ledger_write_failure(
        &self,
        wallet: &str,
        signature: &str,
        token_amount: f64,
        months: u8,
        error: &str,
    ) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            wallet = %wallet,
            signature = %signature,
            token_amount = %token_amount,
            lock_duration_months = %months,
            error = %error,
            "Ledger write failed for a landed purchase; reconcile manually"
        );
    }
}

/// Initialize the global subscriber: `RUST_LOG` wins over the defaults
pub fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "purchase_facilitator=debug,tower_http=debug,info"
    } else {
        "purchase_facilitator=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}
