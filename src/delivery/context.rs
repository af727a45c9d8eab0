//! Per-delivery execution context
//!
//! Bundles the ledger handle, cancellation token and logger one `deliver`
//! call threads through its send strategies. Every suspension point goes
//! through [`SendContext::cancellable`] so cancellation is observed
//! promptly and reported as [`DeliveryError::Cancelled`].

use solana_sdk::signature::Signature;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::DeliveryError;
use crate::ledger::LedgerService;
use crate::structured_logging::DeliveryLogger;

pub struct SendContext<'a> {
    pub ledger: &'a dyn LedgerService,
    pub logger: DeliveryLogger,
    cancel: CancellationToken,
    started: Instant,
}

impl<'a> SendContext<'a> {
    pub fn new(
        ledger: &'a dyn LedgerService,
        logger: DeliveryLogger,
        cancel: CancellationToken,
        started: Instant,
    ) -> Self {
        Self {
            ledger,
            logger,
            cancel,
            started,
        }
    }

    /// Time since the delivery started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled_error(&self, signature: Option<Signature>) -> DeliveryError {
        DeliveryError::cancelled(signature, self.elapsed())
    }

    /// Fail fast if cancellation was already requested.
    pub fn ensure_active(&self, signature: Option<Signature>) -> Result<(), DeliveryError> {
        if self.is_cancelled() {
            return Err(self.cancelled_error(signature));
        }
        Ok(())
    }

    /// Run `fut` unless cancellation fires first.
    pub async fn cancellable<F, T>(
        &self,
        signature: Option<Signature>,
        fut: F,
    ) -> Result<T, DeliveryError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error(signature)),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `duration` unless cancellation fires first.
    pub async fn sleep(
        &self,
        duration: Duration,
        signature: Option<Signature>,
    ) -> Result<(), DeliveryError> {
        self.cancellable(signature, tokio::time::sleep(duration))
            .await
    }
}
