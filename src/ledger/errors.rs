use solana_client::client_error::ClientError;
use thiserror::Error;

/// Ledger-node error taxonomy
///
/// Every failure reported by a [`super::LedgerService`] is mapped into one of
/// these variants so that swallowed submission errors can still be counted
/// per class.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport-level errors (network, connection reset, DNS)
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Blockhash not found")]
    BlockhashNotFound,

    /// Node-side preflight simulation rejected the transaction
    #[error("Preflight check failed: {message}")]
    PreflightFailure { message: String },

    /// Ledger height moved past the checkpoint's validity window
    #[error("Checkpoint expired (last valid height {last_valid_block_height}, current {current_block_height})")]
    CheckpointExpired {
        last_valid_block_height: u64,
        current_block_height: u64,
    },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (code: {code:?})")]
    Rpc { message: String, code: Option<i64> },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Short label used for metrics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            LedgerError::Transport { .. } => "transport",
            LedgerError::Timeout { .. } => "timeout",
            LedgerError::RateLimited => "rate_limited",
            LedgerError::BlockhashNotFound => "blockhash_not_found",
            LedgerError::PreflightFailure { .. } => "preflight",
            LedgerError::CheckpointExpired { .. } => "checkpoint_expired",
            LedgerError::Rpc { .. } => "rpc",
            LedgerError::Decode(_) => "decode",
        }
    }

    /// Check if this error is transient from the node's point of view
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Transport { .. }
            | LedgerError::Timeout { .. }
            | LedgerError::RateLimited
            | LedgerError::BlockhashNotFound => true,

            LedgerError::PreflightFailure { .. }
            | LedgerError::CheckpointExpired { .. }
            | LedgerError::Decode(_) => false,

            // Retry on server errors (5xx)
            LedgerError::Rpc { code, .. } => matches!(code, Some(c) if (500..600).contains(c)),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        LedgerError::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        LedgerError::Timeout {
            message: message.into(),
        }
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        LedgerError::Rpc {
            message: message.into(),
            code: None,
        }
    }

    /// Create from ClientError, classifying by message
    pub fn from_client_error(err: &ClientError) -> Self {
        Self::classify_message(&err.to_string())
    }

    fn classify_message(raw: &str) -> Self {
        let lower = raw.to_lowercase();

        if lower.contains("blockhash not found") {
            LedgerError::BlockhashNotFound
        } else if lower.contains("transaction simulation failed")
            || lower.contains("preflight")
        {
            LedgerError::PreflightFailure {
                message: raw.to_string(),
            }
        } else if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            LedgerError::RateLimited
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LedgerError::Timeout {
                message: raw.to_string(),
            }
        } else if lower.contains("connection")
            || lower.contains("error sending request")
            || lower.contains("dns")
        {
            LedgerError::Transport {
                message: raw.to_string(),
            }
        } else {
            // Extract error code if available
            let code = lower
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches([',', ')']).parse::<i64>().ok());

            LedgerError::Rpc {
                message: raw.to_string(),
                code,
            }
        }
    }
}
