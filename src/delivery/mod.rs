//! Transaction delivery engine
//!
//! One `deliver` call runs a strictly sequential pipeline:
//!
//! 1. resolve lookup tables
//! 2. estimate the compute budget
//! 3. assemble against a fresh checkpoint and sign once
//! 4. [`FastPath`]: replay the signed bytes until confirmed or the window ends
//! 5. [`SafePath`]: exactly one validated send, only if step 4 came back
//!    unconfirmed
//!
//! The engine holds only immutable configuration. Ledger, resolver and
//! signer handles are passed into every call, so any number of deliveries can
//! share one engine concurrently.

pub mod context;
pub mod fast_path;
pub mod poller;
pub mod safe_path;

pub use context::SendContext;
pub use fast_path::FastPath;
pub use poller::ConfirmationPoller;
pub use safe_path::SafePath;

use async_trait::async_trait;
use solana_sdk::{instruction::Instruction, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::DeliveryConfig;
use crate::errors::DeliveryError;
use crate::fees::FeeEstimator;
use crate::ledger::{LedgerService, LookupTableResolver};
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::signer::{sign_compiled, TxSigner};
use crate::structured_logging::DeliveryLogger;
use crate::tx_builder::{SignedTransaction, TxAssembler};
use crate::types::{ComputeBudgetParameters, DeliveryPath, FeeTier, LookupTableRef};

/// Result of running one send strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Confirmed { signature: Signature, attempts: u32 },
    /// The strategy gave up without confirmation; the caller may fall back.
    Unconfirmed { signature: Signature, attempts: u32 },
}

/// A way of getting signed bytes confirmed on the ledger.
#[async_trait]
pub trait SendStrategy: Send + Sync {
    fn path(&self) -> DeliveryPath;

    async fn send(
        &self,
        ctx: &SendContext<'_>,
        tx: &SignedTransaction,
    ) -> Result<SendOutcome, DeliveryError>;
}

/// Inputs of one delivery.
#[derive(Clone, Default)]
pub struct DeliveryRequest {
    pub instructions: Vec<Instruction>,
    /// Falls back to the engine's default tier
    pub fee_tier: Option<FeeTier>,
    pub lookup_tables: Vec<LookupTableRef>,
    /// Co-signers required by the instructions besides the fee payer
    pub additional_signers: Vec<Arc<dyn TxSigner>>,
    pub cancellation: Option<CancellationToken>,
}

impl DeliveryRequest {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Default::default()
        }
    }

    pub fn with_tier(mut self, tier: FeeTier) -> Self {
        self.fee_tier = Some(tier);
        self
    }

    pub fn with_lookup_tables(mut self, refs: Vec<LookupTableRef>) -> Self {
        self.lookup_tables = refs;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TxSigner>) -> Self {
        self.additional_signers.push(signer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl std::fmt::Debug for DeliveryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRequest")
            .field("instructions", &self.instructions.len())
            .field("fee_tier", &self.fee_tier)
            .field("lookup_tables", &self.lookup_tables)
            .field("additional_signers", &self.additional_signers.len())
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub signature: Signature,
    pub path: DeliveryPath,
    /// Fast-path submissions made (the fallback adds none)
    pub broadcast_attempts: u32,
    pub budget: ComputeBudgetParameters,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct DeliveryEngine {
    estimator: FeeEstimator,
    fast: Arc<dyn SendStrategy>,
    fallback: Arc<dyn SendStrategy>,
    default_tier: FeeTier,
}

impl DeliveryEngine {
    /// Engine with the standard fast/safe strategies.
    pub fn new(
        estimator: FeeEstimator,
        fast: FastPath,
        safe: SafePath,
        default_tier: FeeTier,
    ) -> Self {
        Self::with_strategies(estimator, Arc::new(fast), Arc::new(safe), default_tier)
    }

    pub fn with_strategies(
        estimator: FeeEstimator,
        fast: Arc<dyn SendStrategy>,
        fallback: Arc<dyn SendStrategy>,
        default_tier: FeeTier,
    ) -> Self {
        Self {
            estimator,
            fast,
            fallback,
            default_tier,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        config.validate()?;
        let poller = ConfirmationPoller::new(config.poll_interval(), config.poll_window());
        let fast = FastPath::new(config.broadcast_window(), poller);
        let safe = SafePath::new(config.fallback.max_retries);
        Ok(Self::new(
            FeeEstimator::from_config(&config.fees)?,
            fast,
            safe,
            config.fees.default_tier,
        ))
    }

    pub fn estimator(&self) -> &FeeEstimator {
        &self.estimator
    }

    /// Deliver `request` paid and signed by `signer`; returns the confirmed signature.
    pub async fn deliver(
        &self,
        ledger: &dyn LedgerService,
        resolver: &dyn LookupTableResolver,
        signer: &dyn TxSigner,
        request: DeliveryRequest,
    ) -> Result<Signature, DeliveryError> {
        self.deliver_with_receipt(ledger, resolver, signer, request)
            .await
            .map(|receipt| receipt.signature)
    }

    /// Like [`deliver`](Self::deliver) but reports how the signature was confirmed.
    pub async fn deliver_with_receipt(
        &self,
        ledger: &dyn LedgerService,
        resolver: &dyn LookupTableResolver,
        signer: &dyn TxSigner,
        request: DeliveryRequest,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let m = metrics();
        m.deliveries_total.inc();
        m.inflight_deliveries.inc();
        let _inflight = scopeguard::guard((), |_| m.inflight_deliveries.dec());
        let timer = Timer::new();

        let trace = TraceContext::new("deliver");
        let logger = DeliveryLogger::new(trace.correlation_id().clone());
        let cancel = request.cancellation.clone().unwrap_or_default();
        let ctx = SendContext::new(ledger, logger.clone(), cancel, Instant::now());

        let result = self
            .run(&ctx, &trace, resolver, signer, request)
            .instrument(trace.span())
            .await;
        timer.observe_duration(&m.delivery_latency);

        match &result {
            Ok(receipt) => {
                m.record_confirmed(receipt.path.as_str());
                logger.log_success(&receipt.signature, receipt.path, receipt.elapsed);
            }
            Err(e) => {
                m.record_failure(e.category());
                if matches!(e, DeliveryError::Cancelled { .. }) {
                    m.cancellations_total.inc();
                }
                logger.log_failure(e, ctx.elapsed());
            }
        }
        result
    }

    async fn run(
        &self,
        ctx: &SendContext<'_>,
        trace: &TraceContext,
        resolver: &dyn LookupTableResolver,
        signer: &dyn TxSigner,
        request: DeliveryRequest,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        ctx.ensure_active(None)?;
        let tier = request.fee_tier.unwrap_or(self.default_tier);
        let payer = signer.pubkey();
        let assembler = TxAssembler::new(ctx.ledger, resolver);

        let tables = ctx
            .cancellable(None, assembler.resolve_tables(&request.lookup_tables))
            .await??;

        let budget = ctx
            .cancellable(
                None,
                self.estimator
                    .estimate(ctx.ledger, &payer, &request.instructions, &tables, tier)
                    .instrument(trace.child_span("estimate").span()),
            )
            .await??;
        ctx.logger.log_estimated(tier, &budget);

        let compiled = ctx
            .cancellable(
                None,
                assembler
                    .assemble(&payer, &request.instructions, &budget, &tables)
                    .instrument(trace.child_span("assemble").span()),
            )
            .await??;
        let signed = sign_compiled(compiled, signer, &request.additional_signers)?;
        let signature = signed.signature();
        ctx.logger
            .log_assembled(&signature, signed.checkpoint().last_valid_block_height);

        let send_span = trace.child_span("send").span();
        let attempts = match self
            .fast
            .send(ctx, &signed)
            .instrument(send_span.clone())
            .await?
        {
            SendOutcome::Confirmed {
                signature,
                attempts,
            } => {
                return Ok(DeliveryReceipt {
                    signature,
                    path: self.fast.path(),
                    broadcast_attempts: attempts,
                    budget,
                    elapsed: ctx.elapsed(),
                })
            }
            SendOutcome::Unconfirmed { attempts, .. } => attempts,
        };

        metrics().fallbacks_total.inc();
        ctx.logger.log_fallback(&signature, attempts);

        match self
            .fallback
            .send(ctx, &signed)
            .instrument(send_span)
            .await?
        {
            SendOutcome::Confirmed { signature, .. } => Ok(DeliveryReceipt {
                signature,
                path: self.fallback.path(),
                broadcast_attempts: attempts,
                budget,
                elapsed: ctx.elapsed(),
            }),
            SendOutcome::Unconfirmed { signature, .. } => Err(DeliveryError::fallback(
                Some(signature),
                "fallback strategy gave up unconfirmed",
                ctx.elapsed(),
            )),
        }
    }
}
