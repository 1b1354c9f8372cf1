//! Confirmation poller
//!
//! Bounded-time state machine over `getSignatureStatus`:
//!
//! ```text
//! Pending --(durability >= confirmed)--> Confirmed
//! Pending --(landed with error)-------> Failed
//! Pending --(deadline reached)--------> Expired
//! ```
//!
//! A status query that errors or exceeds its per-call timeout is
//! inconclusive and never ends the wait. "Not yet confirmed" is an outcome,
//! not an error: the transaction may still land after the deadline.

use crate::metrics::metrics;
use crate::rpc::{Durability, RpcBackend};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "detail")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
    /// Landed, but execution failed
    Failed(String),
    Expired,
}

impl ConfirmationState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed(_) => "failed",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub state: ConfirmationState,
    pub polls: u32,
    pub elapsed: Duration,
    pub slot: Option<u64>,
}

impl ConfirmationOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.state == ConfirmationState::Confirmed
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationPoller {
    rpc: Arc<dyn RpcBackend>,
    poll_interval: Duration,
    status_timeout: Duration,
}

impl ConfirmationPoller {
    pub fn new(rpc: Arc<dyn RpcBackend>, poll_interval: Duration, status_timeout: Duration) -> Self {
        if status_timeout >= poll_interval {
            warn!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                status_timeout_ms = status_timeout.as_millis() as u64,
                "Status timeout is not shorter than the poll interval"
            );
        }
        Self {
            rpc,
            poll_interval,
            status_timeout,
        }
    }

    pub fn with_defaults(rpc: Arc<dyn RpcBackend>) -> Self {
        Self::new(rpc, DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_TIMEOUT)
    }

    /// `true` once the signature reaches `confirmed` within `deadline`
    pub async fn poll(&self, signature: &Signature, deadline: Duration) -> bool {
        self.wait(signature, deadline).await.is_confirmed()
    }

    /// Run the state machine to a terminal state
    pub async fn wait(&self, signature: &Signature, deadline: Duration) -> ConfirmationOutcome {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut polls = 0u32;

        let outcome = loop {
            // Each query is capped by what is left of the deadline
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break (ConfirmationState::Expired, None);
            }
            polls += 1;
            let query_timeout = self.status_timeout.min(remaining);
            match timeout(query_timeout, self.rpc.get_signature_status(signature)).await {
                Ok(Ok(Some(status))) => {
                    if let Some(err) = status.err {
                        break (ConfirmationState::Failed(err), Some(status.slot));
                    }
                    if status.durability.is_at_least(Durability::Confirmed) {
                        break (ConfirmationState::Confirmed, Some(status.slot));
                    }
                    debug!(%signature, durability = ?status.durability, polls, "Not yet confirmed");
                }
                Ok(Ok(None)) => debug!(%signature, polls, "Signature not yet seen"),
                Ok(Err(e)) => debug!(%signature, polls, error = %e, "Status query failed, continuing"),
                Err(_) => debug!(
                    %signature,
                    polls,
                    timeout_ms = query_timeout.as_millis() as u64,
                    "Status query timed out, continuing"
                ),
            }

            let now = Instant::now();
            if now >= deadline_at {
                break (ConfirmationState::Expired, None);
            }
            sleep(self.poll_interval.min(deadline_at - now)).await;
        };

        let (state, slot) = outcome;
        let elapsed = started.elapsed();
        metrics().confirmations.with_label_values(&[state.label()]).inc();
        match &state {
            ConfirmationState::Confirmed => {
                metrics().confirmation_latency.observe(elapsed.as_secs_f64());
                info!(%signature, polls, elapsed_ms = elapsed.as_millis() as u64, "Transaction confirmed");
            }
            ConfirmationState::Failed(err) => {
                warn!(%signature, error = %err, "Transaction landed with an error")
            }
            _ => info!(%signature, polls, "Transaction not confirmed before deadline"),
        }
        ConfirmationOutcome {
            state,
            polls,
            elapsed,
            slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcManagerError, SignatureStatus};
    use crate::test_utils::MockRpc;

    fn status(durability: Durability) -> SignatureStatus {
        SignatureStatus {
            slot: 10,
            durability,
            err: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_after_two_failed_queries() {
        let rpc = Arc::new(MockRpc::new());
        rpc.script_status(vec![
            Err(RpcManagerError::transport("mock", "reset")),
            Err(RpcManagerError::Timeout {
                endpoint: "mock".into(),
                timeout_ms: 1500,
            }),
            Ok(Some(status(Durability::Confirmed))),
        ]);
        let poller = ConfirmationPoller::with_defaults(rpc.clone());

        assert!(poller.poll(&Signature::new_unique(), Duration::from_secs(60)).await);
        assert_eq!(rpc.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_confirming_expires_at_deadline() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_default_status(Ok(Some(status(Durability::Processed))));
        let poller = ConfirmationPoller::with_defaults(rpc);

        let started = Instant::now();
        let outcome = poller.wait(&Signature::new_unique(), Duration::from_secs(1)).await;
        assert_eq!(outcome.state, ConfirmationState::Expired);
        assert!(started.elapsed() <= Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_query_is_inconclusive() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_status_delay(Duration::from_secs(30));
        let poller = ConfirmationPoller::with_defaults(rpc);

        let started = Instant::now();
        assert!(!poller.poll(&Signature::new_unique(), Duration::from_secs(5)).await);
        assert!(started.elapsed() <= Duration::from_millis(5100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_query_never_outlasts_deadline() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_status_delay(Duration::from_secs(30));
        let poller = ConfirmationPoller::with_defaults(rpc);

        for deadline in [Duration::from_secs(1), Duration::from_millis(3100)] {
            let started = Instant::now();
            let outcome = poller.wait(&Signature::new_unique(), deadline).await;
            assert_eq!(outcome.state, ConfirmationState::Expired);
            assert!(
                started.elapsed() <= deadline + Duration::from_millis(100),
                "overshot {:?} by {:?}",
                deadline,
                started.elapsed().saturating_sub(deadline)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_expires_without_querying() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_default_status(Ok(Some(status(Durability::Confirmed))));
        let poller = ConfirmationPoller::with_defaults(rpc.clone());

        let outcome = poller.wait(&Signature::new_unique(), Duration::ZERO).await;
        assert_eq!(outcome.state, ConfirmationState::Expired);
        assert_eq!(outcome.polls, 0);
        assert_eq!(rpc.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalized_counts_and_error_fails() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_default_status(Ok(Some(status(Durability::Finalized))));
        let poller = ConfirmationPoller::with_defaults(rpc.clone());
        assert!(poller.poll(&Signature::new_unique(), Duration::from_secs(10)).await);

        rpc.set_default_status(Ok(Some(SignatureStatus {
            slot: 11,
            durability: Durability::Confirmed,
            err: Some("InstructionError(0, Custom(1))".into()),
        })));
        let outcome = poller.wait(&Signature::new_unique(), Duration::from_secs(10)).await;
        assert!(matches!(outcome.state, ConfirmationState::Failed(_)));
        assert_eq!(outcome.polls, 1);
    }
}
