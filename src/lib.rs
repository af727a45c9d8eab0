//! Transaction delivery engine for Solana
//!
//! Takes a caller's instructions and returns a confirmed signature:
//! the compute budget is estimated, the message is assembled against a fresh
//! checkpoint and signed exactly once, then broadcast on a low-validation
//! fast path with a single validated fallback send.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use tx_delivery::{DeliveryConfig, DeliveryEngine, DeliveryRequest, RpcLedger, WalletManager};
//!
//! let config = DeliveryConfig::from_file_with_env("delivery.toml")?;
//! tx_delivery::structured_logging::init_monitoring(&config.monitoring)?;
//! let ledger = RpcLedger::from_config(&config)?;
//! let wallet = WalletManager::from_file(&config.wallet.keypair_path)?;
//! let engine = DeliveryEngine::from_config(&config)?;
//!
//! # let instructions = Vec::new();
//! let signature = engine
//!     .deliver(&ledger, &ledger, &wallet, DeliveryRequest::new(instructions))
//!     .await?;
//! # let _ = signature;
//! # Ok(())
//! # }
//! ```

pub mod compat;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod signer;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod types;

pub use config::DeliveryConfig;
pub use delivery::{
    ConfirmationPoller, DeliveryEngine, DeliveryReceipt, DeliveryRequest, FastPath, SafePath,
    SendOutcome, SendStrategy,
};
pub use errors::DeliveryError;
pub use fees::FeeEstimator;
pub use ledger::{LedgerError, LedgerService, LookupTableResolver, RpcLedger};
pub use signer::{SignerError, TxSigner, WalletManager};
pub use tx_builder::{CompiledMessage, SignedTransaction};
pub use types::{
    BroadcastOptions, ComputeBudgetParameters, DeliveryPath, FeeSample, FeeTier, LedgerStatus,
    LookupTableRef, RecentCheckpoint,
};

// Re-export commonly used types
pub use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature};

#[cfg(test)]
mod tests;
