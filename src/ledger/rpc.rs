//! Solana JSON-RPC implementation of the ledger seams

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{
    TransactionConfirmationStatus, TransactionStatus, UiTransactionEncoding,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{LedgerError, LedgerService, LookupTableResolver};
use crate::config::DeliveryConfig;
use crate::errors::DeliveryError;
use crate::tx_builder::SignedTransaction;
use crate::types::{BroadcastOptions, FeeSample, LedgerStatus, RecentCheckpoint};

/// Ledger service backed by a nonblocking [`RpcClient`]
///
/// Cheap to clone; the underlying client is shared and safe for concurrent
/// use by many deliveries.
#[derive(Clone)]
pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    preflight_commitment: CommitmentConfig,
    confirm_interval: Duration,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

impl RpcLedger {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        commitment: CommitmentConfig,
        preflight_commitment: CommitmentConfig,
        confirm_interval: Duration,
    ) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(url.into(), timeout, commitment);
        Self::from_client(
            Arc::new(client),
            commitment,
            preflight_commitment,
            confirm_interval,
        )
    }

    /// Build from the `rpc`, `fallback` and `confirmation` sections.
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        Ok(Self::new(
            config.rpc.url.clone(),
            Duration::from_secs(config.rpc.timeout_secs),
            config.query_commitment()?,
            config.preflight_commitment()?,
            config.confirm_until_interval(),
        ))
    }

    /// Wrap an existing client (shared with other subsystems).
    pub fn from_client(
        client: Arc<RpcClient>,
        commitment: CommitmentConfig,
        preflight_commitment: CommitmentConfig,
        confirm_interval: Duration,
    ) -> Self {
        Self {
            client,
            commitment,
            preflight_commitment,
            confirm_interval,
        }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// One status-then-height check. `None` means still pending inside the
    /// checkpoint window.
    async fn confirm_step(
        &self,
        signature: &Signature,
        checkpoint: &RecentCheckpoint,
    ) -> Result<Option<LedgerStatus>, LedgerError> {
        let status = self.signature_status(signature).await?;
        if status.is_confirmed() || matches!(status, LedgerStatus::Failed(_)) {
            return Ok(Some(status));
        }

        let block_height = self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        if checkpoint.is_expired_at(block_height) {
            return Err(LedgerError::CheckpointExpired {
                last_valid_block_height: checkpoint.last_valid_block_height,
                current_block_height: block_height,
            });
        }

        trace!(
            signature = %signature,
            block_height,
            last_valid = checkpoint.last_valid_block_height,
            "Awaiting confirmation within checkpoint window"
        );
        Ok(None)
    }
}

/// Map a `getSignatureStatuses` entry to a [`LedgerStatus`].
pub(crate) fn map_transaction_status(status: Option<&TransactionStatus>) -> LedgerStatus {
    let Some(status) = status else {
        return LedgerStatus::Unknown;
    };

    if let Some(err) = &status.err {
        return LedgerStatus::Failed(err.to_string());
    }

    match &status.confirmation_status {
        Some(TransactionConfirmationStatus::Processed) => LedgerStatus::Processed,
        Some(TransactionConfirmationStatus::Confirmed) => LedgerStatus::Confirmed,
        Some(TransactionConfirmationStatus::Finalized) => LedgerStatus::Finalized,
        // Older nodes: no confirmations count means the slot is rooted
        None if status.confirmations.is_none() => LedgerStatus::Finalized,
        None => LedgerStatus::Processed,
    }
}

#[async_trait]
impl LedgerService for RpcLedger {
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<Option<u64>, LedgerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..Default::default()
        };

        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        if let Some(err) = &response.value.err {
            debug!(error = %err, "Simulation reported an execution error");
        }

        Ok(response.value.units_consumed)
    }

    async fn latest_checkpoint(&self) -> Result<RecentCheckpoint, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        Ok(RecentCheckpoint::new(blockhash, last_valid_block_height))
    }

    async fn broadcast(
        &self,
        tx: &SignedTransaction,
        options: BroadcastOptions,
    ) -> Result<Signature, LedgerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_validation,
            preflight_commitment: Some(self.preflight_commitment.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: options.max_retries,
            ..Default::default()
        };

        self.client
            .send_transaction_with_config(tx.transaction(), config)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<LedgerStatus, LedgerError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        Ok(map_transaction_status(
            response.value.first().and_then(|s| s.as_ref()),
        ))
    }

    async fn recent_fee_samples(&self) -> Result<Vec<FeeSample>, LedgerError> {
        let fees = self
            .client
            .get_recent_prioritization_fees(&[])
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        Ok(fees
            .into_iter()
            .map(|f| FeeSample::new(f.slot, f.prioritization_fee))
            .collect())
    }

    async fn current_slot(&self) -> Result<u64, LedgerError> {
        self.client
            .get_slot_with_commitment(self.commitment)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))
    }

    async fn confirm_until(
        &self,
        signature: &Signature,
        checkpoint: &RecentCheckpoint,
    ) -> Result<LedgerStatus, LedgerError> {
        loop {
            match self.confirm_step(signature, checkpoint).await {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    debug!(
                        signature = %signature,
                        class = e.class(),
                        error = %e,
                        "Transient error while confirming, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.confirm_interval).await;
        }
    }
}

#[async_trait]
impl LookupTableResolver for RpcLedger {
    async fn resolve(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AddressLookupTableAccount>>, LedgerError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let accounts = self
            .client
            .get_multiple_accounts(addresses)
            .await
            .map_err(|e| LedgerError::from_client_error(&e))?;

        addresses
            .iter()
            .zip(accounts)
            .map(|(key, account)| match account {
                None => Ok(None),
                Some(account) => {
                    let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
                        LedgerError::Decode(format!("lookup table {}: {}", key, e))
                    })?;
                    Ok(Some(AddressLookupTableAccount {
                        key: *key,
                        addresses: table.addresses.to_vec(),
                    }))
                }
            })
            .collect()
    }
}
