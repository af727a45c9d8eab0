//! Core data model for transaction delivery
//!
//! Everything here is created once and never mutated afterwards. The only
//! type with transitions is [`ConfirmationStatus`], which models the
//! lifecycle of one signed transaction as seen by the engine.

use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use std::fmt;
use std::str::FromStr;

/// Maximum compute units a single transaction may request.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// Caller-chosen pricing policy relative to the observed fee market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    /// 1st percentile of recent fees
    Min,
    /// Median of recent fees
    #[default]
    Mid,
    /// 95th percentile of recent fees
    Max,
}

impl FeeTier {
    /// All tiers, cheapest first.
    pub const ALL: [FeeTier; 3] = [FeeTier::Min, FeeTier::Mid, FeeTier::Max];

    /// Percentile of the fee distribution this tier selects.
    pub fn percentile(self) -> f64 {
        match self {
            FeeTier::Min => 0.01,
            FeeTier::Mid => 0.5,
            FeeTier::Max => 0.95,
        }
    }

    /// Priority level name understood by the external estimation service.
    pub fn priority_level(self) -> &'static str {
        match self {
            FeeTier::Min => "Min",
            FeeTier::Mid => "Medium",
            FeeTier::Max => "High",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeeTier::Min => "min",
            FeeTier::Mid => "mid",
            FeeTier::Max => "max",
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(FeeTier::Min),
            "mid" | "medium" => Ok(FeeTier::Mid),
            "max" | "high" => Ok(FeeTier::Max),
            other => Err(format!("unknown fee tier '{}'", other)),
        }
    }
}

/// Compute budget derived once per delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudgetParameters {
    /// Upper bound on compute units the transaction may consume
    pub unit_limit: u32,
    /// Price per compute unit in micro-lamports
    pub unit_price_micro_lamports: u64,
}

impl ComputeBudgetParameters {
    pub fn new(unit_limit: u32, unit_price_micro_lamports: u64) -> Self {
        Self {
            unit_limit,
            unit_price_micro_lamports,
        }
    }

    /// Worst-case priority fee in lamports if every unit is consumed.
    pub fn max_priority_fee_lamports(&self) -> u64 {
        let micro = u128::from(self.unit_limit) * u128::from(self.unit_price_micro_lamports);
        // 1 lamport = 1_000_000 micro-lamports, rounded up
        u64::try_from(micro.div_ceil(1_000_000)).unwrap_or(u64::MAX)
    }
}

/// Short-lived anchor binding a message to a window of ledger heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentCheckpoint {
    /// Recent blockhash the message is compiled against
    pub blockhash: Hash,
    /// Last block height at which the message can still be included
    pub last_valid_block_height: u64,
}

impl RecentCheckpoint {
    pub fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
        }
    }

    /// True once the ledger height has moved past the validity window.
    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

/// One observed per-slot prioritization fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSample {
    pub slot: u64,
    pub micro_lamports: u64,
}

impl FeeSample {
    pub fn new(slot: u64, micro_lamports: u64) -> Self {
        Self {
            slot,
            micro_lamports,
        }
    }
}

/// Reference to an on-chain address lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupTableRef {
    pub address: Pubkey,
    /// Whether an instruction's account list depends on this table.
    /// Missing required tables fail assembly; missing optional ones are dropped.
    pub required: bool,
}

impl LookupTableRef {
    pub fn required(address: Pubkey) -> Self {
        Self {
            address,
            required: true,
        }
    }

    pub fn optional(address: Pubkey) -> Self {
        Self {
            address,
            required: false,
        }
    }
}

/// Submission knobs passed to the ledger service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastOptions {
    /// Skip the node's preflight simulation
    pub skip_validation: bool,
    /// Node-side rebroadcast count (`None` = node default)
    pub max_retries: Option<usize>,
}

impl BroadcastOptions {
    /// Low-validation options used by the fast path.
    pub fn fast() -> Self {
        Self {
            skip_validation: true,
            max_retries: None,
        }
    }

    /// Fully validated options used by the fallback path.
    pub fn validated(max_retries: usize) -> Self {
        Self {
            skip_validation: false,
            max_retries: Some(max_retries),
        }
    }
}

/// Signature status as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Ledger has no record of the signature
    Unknown,
    Processed,
    Confirmed,
    Finalized,
    /// Transaction executed and failed
    Failed(String),
}

impl LedgerStatus {
    /// Confirmed or any later commitment.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, LedgerStatus::Confirmed | LedgerStatus::Finalized)
    }
}

/// Delivery lifecycle of one signed transaction.
///
/// ```text
/// unseen --accepted--> pending --confirmed--> confirmed
///                         |--window elapsed--> timed_out
///                         `--exec failure----> failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmationStatus {
    #[default]
    Unseen,
    Pending,
    Confirmed,
    TimedOut,
    Failed(String),
}

impl ConfirmationStatus {
    /// A broadcast was accepted by the node.
    pub fn on_broadcast_accepted(self) -> Self {
        match self {
            ConfirmationStatus::Unseen | ConfirmationStatus::TimedOut => {
                ConfirmationStatus::Pending
            }
            other => other,
        }
    }

    /// The ledger reported a status for the signature.
    pub fn on_ledger_status(self, status: &LedgerStatus) -> Self {
        match (self, status) {
            (ConfirmationStatus::Pending, s) if s.is_confirmed() => ConfirmationStatus::Confirmed,
            (ConfirmationStatus::Pending, LedgerStatus::Failed(reason)) => {
                ConfirmationStatus::Failed(reason.clone())
            }
            (current, _) => current,
        }
    }

    /// The poll window elapsed.
    pub fn on_window_elapsed(self) -> Self {
        match self {
            ConfirmationStatus::Pending => ConfirmationStatus::TimedOut,
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConfirmationStatus::Confirmed | ConfirmationStatus::Failed(_)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Unseen => "unseen",
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::TimedOut => "timed_out",
            ConfirmationStatus::Failed(_) => "failed",
        }
    }
}

/// Which send strategy produced the confirmed signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryPath {
    Fast,
    Safe,
}

impl DeliveryPath {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryPath::Fast => "fast",
            DeliveryPath::Safe => "safe",
        }
    }
}
