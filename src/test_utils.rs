//! Test Utilities Module
//!
//! Scripted doubles for the ledger and signer seams so delivery scenarios
//! run deterministically under a paused tokio clock.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::ledger::{LedgerError, LedgerService, LookupTableResolver};
use crate::signer::{SignerError, TxSigner};
use crate::tx_builder::SignedTransaction;
use crate::types::{BroadcastOptions, FeeSample, LedgerStatus, RecentCheckpoint};

/// One call to [`LedgerService::broadcast`] as seen by the mock.
#[derive(Debug, Clone)]
pub struct BroadcastRecord {
    pub wire: Vec<u8>,
    pub signature: Signature,
    pub options: BroadcastOptions,
    pub at: Instant,
}

struct LedgerState {
    simulate: Result<Option<u64>, LedgerError>,
    simulations: usize,
    fee_samples: Vec<FeeSample>,
    current_slot: u64,
    checkpoint_error: Option<LedgerError>,
    checkpoints_served: u64,
    fast_results: VecDeque<Result<(), LedgerError>>,
    validated_results: VecDeque<Result<(), LedgerError>>,
    broadcasts: Vec<BroadcastRecord>,
    statuses: VecDeque<Result<LedgerStatus, LedgerError>>,
    status_queries: usize,
    confirm_results: VecDeque<Result<LedgerStatus, LedgerError>>,
    confirm_calls: Vec<(Signature, RecentCheckpoint)>,
    confirm_delay: Duration,
    tables: HashMap<Pubkey, AddressLookupTableAccount>,
}

/// Scripted ledger node
///
/// Unscripted calls fall back to benign defaults: simulations consume
/// 80k units, fee samples are `[10, 20, 30, 40, 50]` at the current slot,
/// broadcasts are accepted, status queries report [`LedgerStatus::Unknown`]
/// and `confirm_until` reports [`LedgerStatus::Confirmed`]. Every
/// checkpoint served is distinct.
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub const DEFAULT_SLOT: u64 = 250_000_000;

    pub fn new() -> Self {
        let fee_samples = [10, 20, 30, 40, 50]
            .iter()
            .map(|&fee| FeeSample::new(Self::DEFAULT_SLOT, fee))
            .collect();

        Self {
            state: Mutex::new(LedgerState {
                simulate: Ok(Some(80_000)),
                simulations: 0,
                fee_samples,
                current_slot: Self::DEFAULT_SLOT,
                checkpoint_error: None,
                checkpoints_served: 0,
                fast_results: VecDeque::new(),
                validated_results: VecDeque::new(),
                broadcasts: Vec::new(),
                statuses: VecDeque::new(),
                status_queries: 0,
                confirm_results: VecDeque::new(),
                confirm_calls: Vec::new(),
                confirm_delay: Duration::ZERO,
                tables: HashMap::new(),
            }),
        }
    }

    pub fn set_simulation(&self, result: Result<Option<u64>, LedgerError>) {
        self.state.lock().simulate = result;
    }

    pub fn set_fee_samples(&self, samples: Vec<FeeSample>, current_slot: u64) {
        let mut state = self.state.lock();
        state.fee_samples = samples;
        state.current_slot = current_slot;
    }

    pub fn fail_checkpoints(&self, error: LedgerError) {
        self.state.lock().checkpoint_error = Some(error);
    }

    /// Queue the outcome of the next low-validation broadcast.
    pub fn push_fast_broadcast(&self, result: Result<(), LedgerError>) {
        self.state.lock().fast_results.push_back(result);
    }

    /// Queue the outcome of the next validated broadcast.
    pub fn push_validated_broadcast(&self, result: Result<(), LedgerError>) {
        self.state.lock().validated_results.push_back(result);
    }

    pub fn push_status(&self, result: Result<LedgerStatus, LedgerError>) {
        self.state.lock().statuses.push_back(result);
    }

    pub fn push_confirm_result(&self, result: Result<LedgerStatus, LedgerError>) {
        self.state.lock().confirm_results.push_back(result);
    }

    /// Make `confirm_until` take `delay` before answering.
    pub fn set_confirm_delay(&self, delay: Duration) {
        self.state.lock().confirm_delay = delay;
    }

    pub fn insert_table(&self, table: AddressLookupTableAccount) {
        self.state.lock().tables.insert(table.key, table);
    }

    pub fn broadcasts(&self) -> Vec<BroadcastRecord> {
        self.state.lock().broadcasts.clone()
    }

    pub fn fast_broadcasts(&self) -> usize {
        self.state
            .lock()
            .broadcasts
            .iter()
            .filter(|b| b.options.skip_validation)
            .count()
    }

    pub fn validated_broadcasts(&self) -> usize {
        self.state
            .lock()
            .broadcasts
            .iter()
            .filter(|b| !b.options.skip_validation)
            .count()
    }

    pub fn status_queries(&self) -> usize {
        self.state.lock().status_queries
    }

    pub fn simulations(&self) -> usize {
        self.state.lock().simulations
    }

    pub fn checkpoints_served(&self) -> u64 {
        self.state.lock().checkpoints_served
    }

    pub fn confirm_calls(&self) -> Vec<(Signature, RecentCheckpoint)> {
        self.state.lock().confirm_calls.clone()
    }

    /// The `n`-th checkpoint this mock hands out (0-based).
    pub fn checkpoint_at(n: u64) -> RecentCheckpoint {
        let mut bytes = [0xA5u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        RecentCheckpoint::new(Hash::new_from_array(bytes), 1_000 + n)
    }
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<Option<u64>, LedgerError> {
        let mut state = self.state.lock();
        state.simulations += 1;
        state.simulate.clone()
    }

    async fn latest_checkpoint(&self) -> Result<RecentCheckpoint, LedgerError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.checkpoint_error {
            return Err(err.clone());
        }
        let checkpoint = Self::checkpoint_at(state.checkpoints_served);
        state.checkpoints_served += 1;
        Ok(checkpoint)
    }

    async fn broadcast(
        &self,
        tx: &SignedTransaction,
        options: BroadcastOptions,
    ) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock();
        let signature = tx.signature();
        state.broadcasts.push(BroadcastRecord {
            wire: tx.wire_bytes().to_vec(),
            signature,
            options,
            at: Instant::now(),
        });

        let scripted = if options.skip_validation {
            state.fast_results.pop_front()
        } else {
            state.validated_results.pop_front()
        };
        scripted.unwrap_or(Ok(())).map(|()| signature)
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<LedgerStatus, LedgerError> {
        let mut state = self.state.lock();
        state.status_queries += 1;
        state
            .statuses
            .pop_front()
            .unwrap_or(Ok(LedgerStatus::Unknown))
    }

    async fn recent_fee_samples(&self) -> Result<Vec<FeeSample>, LedgerError> {
        Ok(self.state.lock().fee_samples.clone())
    }

    async fn current_slot(&self) -> Result<u64, LedgerError> {
        Ok(self.state.lock().current_slot)
    }

    async fn confirm_until(
        &self,
        signature: &Signature,
        checkpoint: &RecentCheckpoint,
    ) -> Result<LedgerStatus, LedgerError> {
        let delay = {
            let mut state = self.state.lock();
            state.confirm_calls.push((*signature, *checkpoint));
            state.confirm_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state
            .lock()
            .confirm_results
            .pop_front()
            .unwrap_or(Ok(LedgerStatus::Confirmed))
    }
}

#[async_trait]
impl LookupTableResolver for MockLedger {
    async fn resolve(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<AddressLookupTableAccount>>, LedgerError> {
        let state = self.state.lock();
        Ok(addresses
            .iter()
            .map(|key| state.tables.get(key).cloned())
            .collect())
    }
}

/// Keypair signer that counts its calls and can be told to refuse.
pub struct MockSigner {
    keypair: Keypair,
    calls: AtomicUsize,
    refuse: AtomicBool,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            calls: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }

    pub fn refusing() -> Self {
        let signer = Self::new();
        signer.refuse.store(true, Ordering::SeqCst);
        signer
    }

    pub fn sign_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TxSigner for MockSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SignerError::Refused {
                pubkey: self.keypair.pubkey(),
                reason: "refused by test".to_string(),
            });
        }
        Ok(Signer::sign_message(&self.keypair, message))
    }
}

/// `count` distinct instructions, each touching one writable account.
pub fn sample_instructions(count: u8) -> Vec<Instruction> {
    let program = Pubkey::new_unique();
    (0..count)
        .map(|i| {
            Instruction::new_with_bytes(
                program,
                &[i],
                vec![AccountMeta::new(Pubkey::new_unique(), false)],
            )
        })
        .collect()
}

/// Lookup table holding `addresses`.
pub fn lookup_table(addresses: Vec<Pubkey>) -> AddressLookupTableAccount {
    AddressLookupTableAccount {
        key: Pubkey::new_unique(),
        addresses,
    }
}
