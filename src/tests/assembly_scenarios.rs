//! Pre-broadcast stages: estimation, lookup tables, assembly and signing.

use std::sync::Arc;

use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    transaction::VersionedTransaction,
};

use crate::config::DeliveryConfig;
use crate::delivery::{DeliveryEngine, DeliveryRequest};
use crate::errors::DeliveryError;
use crate::ledger::LedgerError;
use crate::signer::TxSigner;
use crate::test_utils::{lookup_table, sample_instructions, MockLedger, MockSigner};
use crate::types::{FeeSample, FeeTier, LedgerStatus, LookupTableRef};

fn engine() -> DeliveryEngine {
    DeliveryEngine::from_config(&DeliveryConfig::default()).unwrap()
}

fn confirming_ledger() -> MockLedger {
    let ledger = MockLedger::new();
    ledger.push_status(Ok(LedgerStatus::Confirmed));
    ledger
}

fn first_wire_tx(ledger: &MockLedger) -> VersionedTransaction {
    bincode::deserialize(&ledger.broadcasts()[0].wire).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_budget_instructions_lead_the_message() {
    let ledger = confirming_ledger();
    let signer = MockSigner::new();
    let caller = sample_instructions(2);

    engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(caller.clone()))
        .await
        .unwrap();

    let tx = first_wire_tx(&ledger);
    let keys = tx.message.static_account_keys();
    let ixs = tx.message.instructions();
    assert_eq!(ixs.len(), 4);
    assert_eq!(keys[ixs[0].program_id_index as usize], compute_budget::id());
    assert_eq!(keys[ixs[1].program_id_index as usize], compute_budget::id());
    assert_eq!(
        ixs[0].data,
        ComputeBudgetInstruction::set_compute_unit_limit(180_000).data
    );
    assert_eq!(
        ixs[1].data,
        ComputeBudgetInstruction::set_compute_unit_price(30).data
    );
    assert_eq!(ixs[2].data, caller[0].data);
    assert_eq!(ixs[3].data, caller[1].data);
    assert_eq!(tx.message.recent_blockhash(), &MockLedger::checkpoint_at(0).blockhash);
}

#[tokio::test(start_paused = true)]
async fn test_tier_selects_percentile() {
    for (tier, price) in [(FeeTier::Min, 10), (FeeTier::Mid, 30), (FeeTier::Max, 50)] {
        let ledger = confirming_ledger();
        let signer = MockSigner::new();

        let receipt = engine()
            .deliver_with_receipt(
                &ledger,
                &ledger,
                &signer,
                DeliveryRequest::new(sample_instructions(1)).with_tier(tier),
            )
            .await
            .unwrap();

        assert_eq!(receipt.budget.unit_price_micro_lamports, price, "tier {}", tier);
    }
}

#[tokio::test(start_paused = true)]
async fn test_unusable_simulation_uses_default_limit() {
    let ledger = confirming_ledger();
    ledger.set_simulation(Err(LedgerError::rpc("simulation unavailable")));
    let signer = MockSigner::new();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    assert_eq!(receipt.budget.unit_limit, 200_000);
}

#[tokio::test(start_paused = true)]
async fn test_estimation_failure_stops_before_signing() {
    let ledger = MockLedger::new();
    let slot = MockLedger::DEFAULT_SLOT;
    // Only stale samples: one epoch and a slot old
    ledger.set_fee_samples(vec![FeeSample::new(slot - 432_001, 1_000)], slot);
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::EstimationFailure { tier: FeeTier::Mid, .. }));
    assert_eq!(signer.sign_calls(), 0);
    assert_eq!(ledger.checkpoints_served(), 0);
    assert!(ledger.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_required_table_fails_assembly() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();
    let request = DeliveryRequest::new(sample_instructions(1))
        .with_lookup_tables(vec![LookupTableRef::required(Pubkey::new_unique())]);

    let err = engine()
        .deliver(&ledger, &ledger, &signer, request)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "assembly");
    assert_eq!(ledger.simulations(), 0);
    assert_eq!(signer.sign_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tables_compress_accounts_and_optional_misses_are_dropped() {
    let ledger = confirming_ledger();
    let signer = MockSigner::new();

    let shared = Pubkey::new_unique();
    let table = lookup_table(vec![shared, Pubkey::new_unique()]);
    ledger.insert_table(table.clone());

    let ix = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[9],
        vec![AccountMeta::new(shared, false)],
    );
    let request = DeliveryRequest::new(vec![ix]).with_lookup_tables(vec![
        LookupTableRef::required(table.key),
        LookupTableRef::optional(Pubkey::new_unique()),
    ]);

    engine()
        .deliver(&ledger, &ledger, &signer, request)
        .await
        .unwrap();

    let tx = first_wire_tx(&ledger);
    let lookups = tx.message.address_table_lookups().unwrap();
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].account_key, table.key);
    assert!(!tx.message.static_account_keys().contains(&shared));
}

#[tokio::test(start_paused = true)]
async fn test_caller_budget_instruction_is_rejected() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();
    let mut ixs = sample_instructions(1);
    ixs.push(ComputeBudgetInstruction::set_compute_unit_price(1));

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(ixs))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "assembly");
    assert!(ledger.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_failure_is_assembly_failure() {
    let ledger = MockLedger::new();
    ledger.fail_checkpoints(LedgerError::timeout("request took longer than 30s"));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::AssemblyFailure { .. }));
    assert_eq!(signer.sign_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_refusing_signer_stops_delivery() {
    let ledger = MockLedger::new();
    let signer = MockSigner::refusing();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "signing");
    assert!(ledger.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cosigner_must_be_supplied() {
    let cosigner = Arc::new(MockSigner::new());
    let ix = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[1],
        vec![AccountMeta::new_readonly(cosigner.pubkey(), true)],
    );
    let signer = MockSigner::new();

    let ledger = MockLedger::new();
    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(vec![ix.clone()]))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "signing");

    let ledger = confirming_ledger();
    let request = DeliveryRequest::new(vec![ix]).with_signer(cosigner.clone());
    engine()
        .deliver(&ledger, &ledger, &signer, request)
        .await
        .unwrap();

    assert_eq!(cosigner.sign_calls(), 1);
    let tx = first_wire_tx(&ledger);
    assert_eq!(tx.signatures.len(), 2);
    assert!(tx.verify_with_results().iter().all(|ok| *ok));
}
