//! Fast path, fallback and cancellation timing under a paused clock.
//!
//! Defaults: 60s broadcast window, 5s poll interval, 15s poll window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::transaction::VersionedTransaction;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DeliveryConfig;
use crate::delivery::{
    DeliveryEngine, DeliveryRequest, FastPath, SendContext, SendOutcome, SendStrategy,
};
use crate::errors::DeliveryError;
use crate::fees::FeeEstimator;
use crate::ledger::LedgerError;
use crate::test_utils::{sample_instructions, MockLedger, MockSigner};
use crate::tx_builder::SignedTransaction;
use crate::types::{ComputeBudgetParameters, DeliveryPath, FeeTier, LedgerStatus};

fn engine() -> DeliveryEngine {
    DeliveryEngine::from_config(&DeliveryConfig::default()).unwrap()
}

fn unknown_statuses(ledger: &MockLedger, n: usize) {
    for _ in 0..n {
        ledger.push_status(Ok(LedgerStatus::Unknown));
    }
}

#[tokio::test(start_paused = true)]
async fn test_confirms_on_first_poll() {
    let ledger = MockLedger::new();
    ledger.push_status(Ok(LedgerStatus::Confirmed));
    let signer = MockSigner::new();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(2)))
        .await
        .unwrap();

    assert_eq!(receipt.path, DeliveryPath::Fast);
    assert_eq!(receipt.broadcast_attempts, 1);
    assert_eq!(receipt.elapsed, Duration::from_secs(5));
    assert_eq!(receipt.budget, ComputeBudgetParameters::new(180_000, 30));
    assert_eq!(ledger.fast_broadcasts(), 1);
    assert_eq!(ledger.validated_broadcasts(), 0);
    assert_eq!(ledger.broadcasts()[0].signature, receipt.signature);
}

#[tokio::test(start_paused = true)]
async fn test_rebroadcasts_after_poll_timeout() {
    let ledger = MockLedger::new();
    unknown_statuses(&ledger, 3);
    ledger.push_status(Ok(LedgerStatus::Confirmed));
    let signer = MockSigner::new();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    assert_eq!(receipt.path, DeliveryPath::Fast);
    assert_eq!(receipt.broadcast_attempts, 2);
    assert_eq!(receipt.elapsed, Duration::from_secs(20));

    let broadcasts = ledger.broadcasts();
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(broadcasts[1].at - broadcasts[0].at, Duration::from_secs(15));
    assert_eq!(ledger.validated_broadcasts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_exactly_once_after_window() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();
    let started = Instant::now();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    assert_eq!(receipt.path, DeliveryPath::Safe);
    // Submissions at 0s, 15s, 30s and 45s; the window closes at 60s
    assert_eq!(receipt.broadcast_attempts, 4);
    assert_eq!(ledger.fast_broadcasts(), 4);
    assert_eq!(ledger.validated_broadcasts(), 1);
    assert_eq!(started.elapsed(), Duration::from_secs(60));

    let validated = ledger
        .broadcasts()
        .into_iter()
        .find(|b| !b.options.skip_validation)
        .unwrap();
    assert_eq!(validated.options.max_retries, Some(3));
    assert_eq!(validated.at - started, Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_every_submission_carries_identical_bytes() {
    let ledger = MockLedger::new();
    ledger.push_fast_broadcast(Err(LedgerError::RateLimited));
    let signer = MockSigner::new();

    let signature = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(3)))
        .await
        .unwrap();

    let broadcasts = ledger.broadcasts();
    assert!(broadcasts.len() > 2);
    assert!(broadcasts.iter().all(|b| b.wire == broadcasts[0].wire));
    assert!(broadcasts.iter().all(|b| b.signature == signature));
    assert_eq!(signer.sign_calls(), 1);
    assert_eq!(ledger.checkpoints_served(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submissions_are_retried_immediately() {
    let ledger = MockLedger::new();
    ledger.push_fast_broadcast(Err(LedgerError::RateLimited));
    ledger.push_fast_broadcast(Err(LedgerError::transport("connection reset")));
    ledger.push_status(Ok(LedgerStatus::Finalized));
    let signer = MockSigner::new();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    assert_eq!(receipt.path, DeliveryPath::Fast);
    assert_eq!(receipt.broadcast_attempts, 3);
    assert_eq!(receipt.elapsed, Duration::from_secs(5));
    assert_eq!(ledger.status_queries(), 1);

    let broadcasts = ledger.broadcasts();
    assert_eq!(broadcasts[1].at - broadcasts[0].at, Duration::ZERO);
    assert_eq!(broadcasts[2].at - broadcasts[1].at, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_each_delivery_binds_a_fresh_checkpoint() {
    let ledger = MockLedger::new();
    ledger.push_status(Ok(LedgerStatus::Confirmed));
    ledger.push_status(Ok(LedgerStatus::Confirmed));
    let signer = MockSigner::new();
    let engine = engine();

    let first = engine
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();
    let second = engine
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    let broadcasts = ledger.broadcasts();
    let first_tx: VersionedTransaction = bincode::deserialize(&broadcasts[0].wire).unwrap();
    let second_tx: VersionedTransaction = bincode::deserialize(&broadcasts[1].wire).unwrap();
    assert_eq!(ledger.checkpoints_served(), 2);
    assert_ne!(first, second);
    assert_ne!(
        first_tx.message.recent_blockhash(),
        second_tx.message.recent_blockhash()
    );
    assert_eq!(
        second_tx.message.recent_blockhash(),
        &MockLedger::checkpoint_at(1).blockhash
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_rides_out_transient_confirmation_errors() {
    let ledger = MockLedger::new();
    ledger.push_confirm_result(Err(LedgerError::timeout("request took longer than 30s")));
    ledger.push_confirm_result(Err(LedgerError::RateLimited));
    ledger.push_confirm_result(Ok(LedgerStatus::Confirmed));
    let signer = MockSigner::new();

    let receipt = engine()
        .deliver_with_receipt(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    assert_eq!(receipt.path, DeliveryPath::Safe);
    assert_eq!(ledger.validated_broadcasts(), 1);
    let calls = ledger.confirm_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(sig, cp)| *sig == receipt.signature && *cp == MockLedger::checkpoint_at(0)));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_gives_up_on_permanent_confirmation_error() {
    let ledger = MockLedger::new();
    ledger.push_confirm_result(Err(LedgerError::rpc("invalid params")));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "fallback");
    assert_eq!(ledger.confirm_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_execution_failure_skips_fallback() {
    let ledger = MockLedger::new();
    ledger.push_status(Ok(LedgerStatus::Failed(
        "Error processing Instruction 2: custom program error: 0x1".into(),
    )));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::ExecutionFailed { .. }));
    assert_eq!(ledger.validated_broadcasts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_confirms_against_submission_checkpoint() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();

    let signature = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap();

    let calls = ledger.confirm_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, signature);
    assert_eq!(calls[0].1, MockLedger::checkpoint_at(0));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_rejection_is_terminal() {
    let ledger = MockLedger::new();
    ledger.push_validated_broadcast(Err(LedgerError::PreflightFailure {
        message: "Transaction simulation failed: Blockhash not found".into(),
    }));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeliveryError::FallbackFailure { signature: Some(_), elapsed, .. }
            if elapsed == Duration::from_secs(60)
    ));
    assert_eq!(ledger.validated_broadcasts(), 1);
    assert!(ledger.confirm_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fallback_checkpoint_expiry_fails() {
    let ledger = MockLedger::new();
    ledger.push_confirm_result(Err(LedgerError::CheckpointExpired {
        last_valid_block_height: 1_000,
        current_block_height: 1_151,
    }));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "fallback");
    assert!(err.to_string().contains("Checkpoint expired"));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_execution_failure_is_reported() {
    let ledger = MockLedger::new();
    ledger.push_confirm_result(Ok(LedgerStatus::Failed("InsufficientFundsForFee".into())));
    let signer = MockSigner::new();

    let err = engine()
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::ExecutionFailed { reason, .. } if reason == "InsufficientFundsForFee"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_fast_path() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();
    let token = CancellationToken::new();
    let started = Instant::now();

    let request = DeliveryRequest::new(sample_instructions(1)).with_cancellation(token.clone());
    let engine = engine();
    let delivery = engine.deliver(&ledger, &ledger, &signer, request);
    let cancel = async {
        tokio::time::sleep(Duration::from_secs(22)).await;
        token.cancel();
    };
    let (result, _) = tokio::join!(delivery, cancel);

    assert!(matches!(
        result.unwrap_err(),
        DeliveryError::Cancelled { signature: Some(_), .. }
    ));
    assert_eq!(started.elapsed(), Duration::from_secs(22));
    assert_eq!(ledger.fast_broadcasts(), 2);
    assert_eq!(ledger.validated_broadcasts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_fallback() {
    let ledger = MockLedger::new();
    ledger.set_confirm_delay(Duration::from_secs(30));
    let signer = MockSigner::new();
    let token = CancellationToken::new();
    let started = Instant::now();

    let request = DeliveryRequest::new(sample_instructions(1)).with_cancellation(token.clone());
    let engine = engine();
    let delivery = engine.deliver(&ledger, &ledger, &signer, request);
    let cancel = async {
        tokio::time::sleep(Duration::from_secs(70)).await;
        token.cancel();
    };
    let (result, _) = tokio::join!(delivery, cancel);

    assert_eq!(result.unwrap_err().category(), "cancelled");
    assert_eq!(started.elapsed(), Duration::from_secs(70));
    assert_eq!(ledger.validated_broadcasts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_does_no_work() {
    let ledger = MockLedger::new();
    let signer = MockSigner::new();
    let token = CancellationToken::new();
    token.cancel();

    let err = engine()
        .deliver(
            &ledger,
            &ledger,
            &signer,
            DeliveryRequest::new(sample_instructions(1)).with_cancellation(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Cancelled { signature: None, .. }));
    assert_eq!(ledger.simulations(), 0);
    assert_eq!(signer.sign_calls(), 0);
    assert!(ledger.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_deliveries_share_one_engine() {
    let engine = engine();
    let (a, b) = (MockLedger::new(), MockLedger::new());
    a.push_status(Ok(LedgerStatus::Confirmed));
    unknown_statuses(&b, 3);
    b.push_status(Ok(LedgerStatus::Confirmed));
    let signer = MockSigner::new();

    let (first, second) = tokio::join!(
        engine.deliver_with_receipt(&a, &a, &signer, DeliveryRequest::new(sample_instructions(1))),
        engine.deliver_with_receipt(&b, &b, &signer, DeliveryRequest::new(sample_instructions(1))),
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.signature, second.signature);
    assert_eq!(first.broadcast_attempts, 1);
    assert_eq!(second.broadcast_attempts, 2);
    assert_eq!(signer.sign_calls(), 2);
}

/// Fallback that never confirms.
struct GiveUp;

#[async_trait]
impl SendStrategy for GiveUp {
    fn path(&self) -> DeliveryPath {
        DeliveryPath::Safe
    }

    async fn send(
        &self,
        _ctx: &SendContext<'_>,
        tx: &SignedTransaction,
    ) -> Result<SendOutcome, DeliveryError> {
        Ok(SendOutcome::Unconfirmed {
            signature: tx.signature(),
            attempts: 0,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_fallback_becomes_failure() {
    let config = DeliveryConfig::default();
    let engine = DeliveryEngine::with_strategies(
        FeeEstimator::from_config(&config.fees).unwrap(),
        Arc::new(FastPath::default()),
        Arc::new(GiveUp),
        FeeTier::Mid,
    );
    let ledger = MockLedger::new();
    let signer = MockSigner::new();

    let err = engine
        .deliver(&ledger, &ledger, &signer, DeliveryRequest::new(sample_instructions(1)))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "fallback");
    assert_eq!(ledger.fast_broadcasts(), 4);
}
