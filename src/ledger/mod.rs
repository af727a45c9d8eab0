//! Ledger collaborator seams
//!
//! The engine never talks to a node directly; it goes through the
//! [`LedgerService`] and [`LookupTableResolver`] traits so that every
//! delivery receives its handles explicitly. [`RpcLedger`] is the production
//! implementation over the nonblocking Solana RPC client.

use async_trait::async_trait;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

use crate::tx_builder::SignedTransaction;
use crate::types::{BroadcastOptions, FeeSample, LedgerStatus, RecentCheckpoint};

pub mod errors;
pub mod rpc;

pub use errors::LedgerError;
pub use rpc::RpcLedger;

/// Query/broadcast surface of a ledger node
///
/// Implementations must be safe for concurrent use by many in-flight
/// deliveries.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Simulate an unsigned transaction and return the units it consumed, if any.
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<Option<u64>, LedgerError>;

    /// Fetch a fresh checkpoint to compile a message against.
    async fn latest_checkpoint(&self) -> Result<RecentCheckpoint, LedgerError>;

    /// Submit signed bytes; the returned signature identifies the transaction.
    async fn broadcast(
        &self,
        tx: &SignedTransaction,
        options: BroadcastOptions,
    ) -> Result<Signature, LedgerError>;

    async fn signature_status(&self, signature: &Signature) -> Result<LedgerStatus, LedgerError>;

    /// Recently observed per-slot prioritization fees.
    async fn recent_fee_samples(&self) -> Result<Vec<FeeSample>, LedgerError>;

    async fn current_slot(&self) -> Result<u64, LedgerError>;

    /// Wait until the signature confirms, fails, or the checkpoint expires.
    ///
    /// Expiry is reported as [`LedgerError::CheckpointExpired`].
    async fn confirm_until(
        &self,
        signature: &Signature,
        checkpoint: &RecentCheckpoint,
    ) -> Result<LedgerStatus, LedgerError>;
}

/// Resolves lookup-table addresses to their on-chain contents.
#[async_trait]
pub trait LookupTableResolver: Send + Sync {
    /// Returns one entry per requested address, `None` when the table does not exist.
    async fn resolve(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AddressLookupTableAccount>>, LedgerError>;
}
