//! Error types for transaction delivery
//!
//! One taxonomy covers the whole pipeline (estimate, assemble, sign,
//! broadcast, confirm, fallback). Transient submission errors are absorbed
//! inside the fast path; every other variant reaches the caller with enough
//! context (signature, tier, elapsed time) to decide whether to call
//! `deliver` again.

use solana_sdk::signature::Signature;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::types::FeeTier;

/// Comprehensive error type for all delivery operations
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Compute sizing or priority-fee pricing produced nothing usable
    ///
    /// Never downgraded into a default price.
    #[error("Fee estimation failed (tier={tier}): {reason}")]
    EstimationFailure { tier: FeeTier, reason: String },

    /// A required lookup table was missing, the checkpoint could not be
    /// fetched, or the message failed to compile
    #[error("Assembly failed: {reason}")]
    AssemblyFailure { reason: String },

    /// A required signer was absent or refused to sign
    #[error("Signing failed: {reason}")]
    Signing { reason: String },

    /// Broadcast rejected by the node
    ///
    /// Retried silently inside the broadcast window; only observable through
    /// metrics and debug logs.
    #[error("Submission rejected: {source}")]
    SubmissionTransient {
        #[source]
        source: LedgerError,
    },

    /// The poll window elapsed without a confirmed status
    #[error("Transaction {signature}'s confirmation timed out after {elapsed:?}")]
    ConfirmationTimeout {
        signature: Signature,
        elapsed: Duration,
    },

    /// The ledger executed the transaction and reported failure
    #[error("Transaction {signature} failed on-chain: {reason}")]
    ExecutionFailed { signature: Signature, reason: String },

    /// The validated fallback send or its confirmation failed
    #[error("Fallback send failed after {elapsed:?} (signature={signature:?}): {reason}")]
    FallbackFailure {
        signature: Option<Signature>,
        reason: String,
        elapsed: Duration,
    },

    /// External cancellation observed mid-flight
    #[error("Delivery cancelled after {elapsed:?} (signature={signature:?})")]
    Cancelled {
        signature: Option<Signature>,
        elapsed: Duration,
    },

    /// Invalid configuration or request
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::EstimationFailure { .. } => "estimation",
            Self::AssemblyFailure { .. } => "assembly",
            Self::Signing { .. } => "signing",
            Self::SubmissionTransient { .. } => "submission",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::ExecutionFailed { .. } => "execution",
            Self::FallbackFailure { .. } => "fallback",
            Self::Cancelled { .. } => "cancelled",
            Self::Configuration(_) => "config",
        }
    }

    /// Signature the error refers to, when one exists
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::ConfirmationTimeout { signature, .. }
            | Self::ExecutionFailed { signature, .. } => Some(signature),
            Self::FallbackFailure { signature, .. } | Self::Cancelled { signature, .. } => {
                signature.as_ref()
            }
            _ => None,
        }
    }
}

// Convenience constructors for common error scenarios
impl DeliveryError {
    pub fn estimation(tier: FeeTier, reason: impl Into<String>) -> Self {
        Self::EstimationFailure {
            tier,
            reason: reason.into(),
        }
    }

    pub fn assembly(reason: impl Into<String>) -> Self {
        Self::AssemblyFailure {
            reason: reason.into(),
        }
    }

    pub fn signing(reason: impl Into<String>) -> Self {
        Self::Signing {
            reason: reason.into(),
        }
    }

    pub fn fallback(
        signature: Option<Signature>,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self::FallbackFailure {
            signature,
            reason: reason.into(),
            elapsed,
        }
    }

    pub fn cancelled(signature: Option<Signature>, elapsed: Duration) -> Self {
        Self::Cancelled { signature, elapsed }
    }
}

impl From<LedgerError> for DeliveryError {
    fn from(source: LedgerError) -> Self {
        Self::SubmissionTransient { source }
    }
}
