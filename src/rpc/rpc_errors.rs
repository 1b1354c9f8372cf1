use solana_client::client_error::{ClientError, ClientErrorKind};
use thiserror::Error;

/// RPC error taxonomy shared by every network read and write
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    /// The liveness token referenced by a transaction is unknown to the node
    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Node answered with something we could not interpret
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,

            // A stale liveness token needs a rebuild, never a resend
            RpcManagerError::BlockhashNotFound { .. } => false,
            RpcManagerError::TransactionExpired { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::Malformed(_) => false,
            RpcManagerError::Internal(_) => false,

            RpcManagerError::RpcResponse { code, .. } => {
                // Retry on server errors (5xx)
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcManagerError::RateLimitExceeded { endpoint } => Some(endpoint),
            RpcManagerError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcManagerError::TransactionExpired { endpoint } => Some(endpoint),
            RpcManagerError::InsufficientFunds { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            RpcManagerError::Transport { .. } => "transport",
            RpcManagerError::Timeout { .. } => "timeout",
            RpcManagerError::RpcResponse { .. } => "response",
            RpcManagerError::RateLimitExceeded { .. } => "rate_limit",
            RpcManagerError::BlockhashNotFound { .. } => "blockhash",
            RpcManagerError::TransactionExpired { .. } => "expired",
            RpcManagerError::InsufficientFunds { .. } => "funds",
            RpcManagerError::Malformed(_) => "malformed",
            RpcManagerError::Internal(_) => "internal",
        }
    }

    pub fn transport(endpoint: &str, message: impl Into<String>) -> Self {
        RpcManagerError::Transport {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str, timeout_ms: u64) -> Self {
        if let ClientErrorKind::RpcError(solana_rpc_client_api::request::RpcError::RpcResponseError {
            code,
            message,
            ..
        }) = err.kind()
        {
            return Self::classify_message(message, endpoint, timeout_ms)
                .unwrap_or_else(|| RpcManagerError::RpcResponse {
                    endpoint: endpoint.to_string(),
                    message: message.clone(),
                    code: Some(*code),
                });
        }

        let transport_level = matches!(
            err.kind(),
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_)
        );
        let message = err.to_string();

        if let Some(classified) = Self::classify_message(&message, endpoint, timeout_ms) {
            return classified;
        }
        if transport_level {
            return RpcManagerError::transport(endpoint, message);
        }
        match err.kind() {
            ClientErrorKind::SerdeJson(_) => RpcManagerError::Malformed(message),
            _ => RpcManagerError::RpcResponse {
                endpoint: endpoint.to_string(),
                message,
                code: None,
            },
        }
    }

    fn classify_message(message: &str, endpoint: &str, timeout_ms: u64) -> Option<Self> {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            Some(RpcManagerError::BlockhashNotFound { endpoint })
        } else if err_str.contains("transaction expired") || err_str.contains("block height exceeded") {
            Some(RpcManagerError::TransactionExpired { endpoint })
        } else if err_str.contains("insufficient funds") || err_str.contains("insufficient lamports") {
            Some(RpcManagerError::InsufficientFunds { endpoint })
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            Some(RpcManagerError::RateLimitExceeded { endpoint })
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            Some(RpcManagerError::Timeout {
                endpoint,
                timeout_ms,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};

    fn response_error(code: i64, message: &str) -> ClientError {
        ClientError::from(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message: message.to_string(),
            data: RpcResponseErrorData::Empty,
        }))
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcManagerError::transport("test", "connection failed").is_retryable());
        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(!RpcManagerError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_retryable());
        assert!(!RpcManagerError::BlockhashNotFound {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_response_codes() {
        let server_side = RpcManagerError::from_client_error(
            response_error(503, "Service unavailable"),
            "https://rpc.test",
            1000,
        );
        assert!(matches!(server_side, RpcManagerError::RpcResponse { code: Some(503), .. }));
        assert!(server_side.is_retryable());

        let client_side = RpcManagerError::from_client_error(
            response_error(-32602, "Invalid params"),
            "https://rpc.test",
            1000,
        );
        assert!(!client_side.is_retryable());
    }

    #[test]
    fn test_classifies_blockhash_not_found() {
        let err = RpcManagerError::from_client_error(
            response_error(-32002, "Transaction simulation failed: Blockhash not found"),
            "https://rpc.test",
            1000,
        );
        assert_eq!(
            err,
            RpcManagerError::BlockhashNotFound {
                endpoint: "https://rpc.test".to_string()
            }
        );
    }

    #[test]
    fn test_io_error_is_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = RpcManagerError::from_client_error(ClientError::from(io), "https://rpc.test", 1000);
        assert!(matches!(err, RpcManagerError::Transport { .. }));
        assert_eq!(err.endpoint(), Some("https://rpc.test"));
    }
}
